//! # Messages
//!
//! Immutable records appended to a topic log.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message in a topic log
///
/// Cloning is cheap: the topic name and payload are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic the message was published to
    pub topic: Arc<str>,

    /// Opaque payload
    pub payload: Bytes,

    /// Strictly increasing per topic, starting at 1
    pub sequence: u64,

    /// Time the message was appended
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(topic: Arc<str>, payload: Bytes, sequence: u64) -> Self {
        Self {
            topic,
            payload,
            sequence,
            published_at: Utc::now(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Serialize to wire format
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            topic: self.topic.to_string(),
            sequence: self.sequence,
            payload: self.payload_text(),
            published_at: self.published_at.to_rfc3339(),
        }
    }
}

/// JSON shape of a message in HTTP responses
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub topic: String,
    pub sequence: u64,
    pub payload: String,
    pub published_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(Arc::from("news"), Bytes::from_static(b"hello"), 1);
        assert_eq!(&*msg.topic, "news");
        assert_eq!(msg.sequence, 1);
        assert_eq!(msg.len(), 5);
        assert_eq!(msg.payload_text(), "hello");
    }

    #[test]
    fn test_wire_format() {
        let msg = Message::new(Arc::from("news"), Bytes::from_static(b"update"), 7);
        let wire = serde_json::to_value(msg.to_wire()).unwrap();
        assert_eq!(wire["topic"], "news");
        assert_eq!(wire["sequence"], 7);
        assert_eq!(wire["payload"], "update");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let msg = Message::new(Arc::from("bin"), Bytes::from_static(&[0xff, b'a']), 1);
        assert_eq!(msg.payload_text(), "\u{fffd}a");
    }
}
