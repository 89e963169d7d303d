//! Observability events for AeroMQ
//!
//! Every lifecycle event the broker logs is a variant here. The
//! `as_str()` name is emitted as the `event` field of the log record.

use std::fmt;

/// Observable events in AeroMQ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Process startup begins
    BootStart,
    /// Configuration loaded
    ConfigLoaded,
    /// Broker constructed and sweeper running
    BrokerStart,
    /// Broker stopped
    BrokerStop,
    /// HTTP listener bound
    Serving,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,

    // Topics
    /// Topic created on first use
    TopicCreated,
    /// Topic removed administratively
    TopicRemoved,
    /// Topic removed by retention
    TopicExpired,

    // Publish
    /// Publish rejected by validation
    PublishRejected,

    // Subscribers
    /// Subscriber registered
    SubscriberRegistered,
    /// Subscriber turned idle
    SubscriberIdle,
    /// Subscriber disconnected
    SubscriberDisconnected,
    /// Subscriber resumed with a fresh transport
    SubscriberResumed,
    /// Subscriber removed
    SubscriberRemoved,

    // Delivery
    /// Dispatch unit started
    DispatchStarted,
    /// Dispatch unit stopped
    DispatchStopped,
    /// Transport write retried
    DeliveryRetry,
    /// Retry ceiling exceeded
    DeliveryFailed,
    /// Topic sequence counter corrupted (FATAL)
    SequenceCorruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            // Boot & Lifecycle
            Event::BootStart => "AEROMQ_STARTUP_BEGIN",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::BrokerStart => "BROKER_START",
            Event::BrokerStop => "BROKER_STOP",
            Event::Serving => "AEROMQ_SERVING",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            // Topics
            Event::TopicCreated => "TOPIC_CREATED",
            Event::TopicRemoved => "TOPIC_REMOVED",
            Event::TopicExpired => "TOPIC_EXPIRED",

            // Publish
            Event::PublishRejected => "PUBLISH_REJECTED",

            // Subscribers
            Event::SubscriberRegistered => "SUBSCRIBER_REGISTERED",
            Event::SubscriberIdle => "SUBSCRIBER_IDLE",
            Event::SubscriberDisconnected => "SUBSCRIBER_DISCONNECTED",
            Event::SubscriberResumed => "SUBSCRIBER_RESUMED",
            Event::SubscriberRemoved => "SUBSCRIBER_REMOVED",

            // Delivery
            Event::DispatchStarted => "DISPATCH_STARTED",
            Event::DispatchStopped => "DISPATCH_STOPPED",
            Event::DeliveryRetry => "DELIVERY_RETRY",
            Event::DeliveryFailed => "DELIVERY_FAILED",
            Event::SequenceCorruption => "SEQUENCE_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::SequenceCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::BootStart,
            Event::ConfigLoaded,
            Event::BrokerStart,
            Event::BrokerStop,
            Event::Serving,
            Event::ShutdownStart,
            Event::ShutdownComplete,
            Event::TopicCreated,
            Event::TopicRemoved,
            Event::TopicExpired,
            Event::PublishRejected,
            Event::SubscriberRegistered,
            Event::SubscriberIdle,
            Event::SubscriberDisconnected,
            Event::SubscriberResumed,
            Event::SubscriberRemoved,
            Event::DispatchStarted,
            Event::DispatchStopped,
            Event::DeliveryRetry,
            Event::DeliveryFailed,
            Event::SequenceCorruption,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::SequenceCorruption.is_fatal());
        assert!(!Event::SubscriberDisconnected.is_fatal());
        assert!(!Event::DeliveryFailed.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::BrokerStart), "BROKER_START");
        assert_eq!(
            format!("{}", Event::SubscriberDisconnected),
            "SUBSCRIBER_DISCONNECTED"
        );
    }
}
