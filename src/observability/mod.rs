//! Observability subsystem for AeroMQ
//!
//! This module provides:
//! - Structured logging through `tracing`
//! - Atomic counters
//! - Typed lifecycle events
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on broker state
//! 3. Failures here never crash the broker
//!
//! # Usage
//!
//! ```ignore
//! use aeromq::observability::{init_logging, Event, LoggingConfig, MetricsRegistry};
//!
//! init_logging(&LoggingConfig::default())?;
//! tracing::info!(event = %Event::BrokerStart, "broker started");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_messages_published();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{build_filter, init_logging, LogFormat, LoggingConfig};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

use std::fmt;

/// Observability error code
///
/// Format: AERO_CATEGORY_NAME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservabilityErrorCode {
    /// Observability operation failed
    AeroObservabilityFailed,
}

impl ObservabilityErrorCode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservabilityErrorCode::AeroObservabilityFailed => "AERO_OBSERVABILITY_FAILED",
        }
    }
}

impl fmt::Display for ObservabilityErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observability error
///
/// Observability failure must never crash AeroMQ.
#[derive(Debug, thiserror::Error)]
#[error("[ERROR] {code}: {message}")]
pub struct ObservabilityError {
    code: ObservabilityErrorCode,
    message: String,
}

impl ObservabilityError {
    /// Create a new observability error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: ObservabilityErrorCode::AeroObservabilityFailed,
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> ObservabilityErrorCode {
        self.code
    }

    /// Get the message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Observability errors are never fatal
    pub fn is_fatal(&self) -> bool {
        false
    }
}

/// Result type for observability operations
pub type ObservabilityResult<T> = Result<T, ObservabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_error_not_fatal() {
        let err = ObservabilityError::new("test error");
        assert!(!err.is_fatal());
        assert_eq!(err.code(), ObservabilityErrorCode::AeroObservabilityFailed);
    }

    #[test]
    fn test_observability_error_display() {
        let err = ObservabilityError::new("test message");
        let display = format!("{}", err);
        assert!(display.contains("ERROR"));
        assert!(display.contains("AERO_OBSERVABILITY_FAILED"));
        assert!(display.contains("test message"));
    }
}
