//! # Broker Errors
//!
//! Error types for the broker core.

use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    // ==================
    // Validation Errors
    // ==================
    /// Published payload was empty
    #[error("Message must not be empty")]
    EmptyMessage,

    /// Published payload exceeds the configured ceiling
    #[error("Message too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    /// Topic name rejected by validation
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    // ==================
    // Lookup Errors
    // ==================
    /// Topic does not exist and implicit creation is disabled
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Subscriber does not exist (never created or already removed)
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),

    /// Topic still has bound subscribers
    #[error("Topic {0} still has subscribers")]
    TopicInUse(String),

    // ==================
    // Cursor Errors
    // ==================
    /// Cursor regressed or ran past the topic head
    #[error("Invalid cursor {requested} (current: {current}, head: {head})")]
    InvalidCursor { requested: u64, current: u64, head: u64 },

    // ==================
    // Delivery Errors
    // ==================
    /// Transport write failed; retried by the dispatcher
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Subscriber exceeded its liveness window
    #[error("Liveness timeout for subscriber {0}")]
    LivenessTimeout(String),

    // ==================
    // Internal Errors
    // ==================
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::EmptyMessage => "AERO_BROKER_EMPTY_MESSAGE",
            BrokerError::PayloadTooLarge { .. } => "AERO_BROKER_PAYLOAD_TOO_LARGE",
            BrokerError::InvalidTopic(_) => "AERO_BROKER_INVALID_TOPIC",
            BrokerError::UnknownTopic(_) => "AERO_BROKER_UNKNOWN_TOPIC",
            BrokerError::SubscriberNotFound(_) => "AERO_BROKER_SUBSCRIBER_NOT_FOUND",
            BrokerError::TopicInUse(_) => "AERO_BROKER_TOPIC_IN_USE",
            BrokerError::InvalidCursor { .. } => "AERO_BROKER_INVALID_CURSOR",
            BrokerError::TransportFailure(_) => "AERO_BROKER_TRANSPORT_FAILURE",
            BrokerError::LivenessTimeout(_) => "AERO_BROKER_LIVENESS_TIMEOUT",
            BrokerError::Internal(_) => "AERO_BROKER_INTERNAL",
            BrokerError::Config(_) => "AERO_BROKER_CONFIG",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::EmptyMessage => 400,
            BrokerError::InvalidTopic(_) => 400,
            BrokerError::InvalidCursor { .. } => 400,
            BrokerError::PayloadTooLarge { .. } => 413,
            BrokerError::UnknownTopic(_) => 404,
            BrokerError::SubscriberNotFound(_) => 404,
            BrokerError::TopicInUse(_) => 409,
            BrokerError::TransportFailure(_) => 503,
            BrokerError::LivenessTimeout(_) => 503,
            BrokerError::Internal(_) => 500,
            BrokerError::Config(_) => 500,
        }
    }

    /// Whether the dispatcher should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::TransportFailure(_))
    }

    pub(crate) fn poisoned() -> Self {
        BrokerError::Internal("Lock poisoned".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(BrokerError::EmptyMessage.status_code(), 400);
        assert_eq!(
            BrokerError::PayloadTooLarge { size: 10, max: 5 }.status_code(),
            413
        );
        assert_eq!(BrokerError::UnknownTopic("t".into()).status_code(), 404);
        assert_eq!(BrokerError::TopicInUse("t".into()).status_code(), 409);
    }

    #[test]
    fn test_only_transport_failures_are_transient() {
        assert!(BrokerError::TransportFailure("closed".into()).is_transient());
        assert!(!BrokerError::EmptyMessage.is_transient());
        assert!(!BrokerError::LivenessTimeout("s".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = BrokerError::PayloadTooLarge { size: 70000, max: 65536 };
        assert_eq!(
            err.to_string(),
            "Message too large: 70000 bytes (max: 65536 bytes)"
        );
        assert_eq!(err.code(), "AERO_BROKER_PAYLOAD_TOO_LARGE");
    }
}
