//! # Publish Pipeline
//!
//! Validates a published payload, appends it to the topic log and hands the
//! topic to the dispatcher. Publishing returns as soon as the message is in
//! the in-memory log; delivery is asynchronous.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use super::dispatcher::DeliveryDispatcher;
use super::errors::{BrokerError, BrokerResult};
use super::topic::TopicRegistry;
use crate::observability::{Event, MetricsRegistry};

/// Outcome of a successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    /// Sequence assigned to the message
    pub sequence: u64,

    /// Subscribers bound and not disconnected at fan-out time
    pub accepted_subscriber_count: usize,
}

/// Publish entry point
#[derive(Debug)]
pub struct PublishPipeline {
    registry: Arc<TopicRegistry>,
    dispatcher: Arc<DeliveryDispatcher>,
    max_payload_bytes: usize,
    metrics: Arc<MetricsRegistry>,
}

impl PublishPipeline {
    pub fn new(
        registry: Arc<TopicRegistry>,
        dispatcher: Arc<DeliveryDispatcher>,
        max_payload_bytes: usize,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            max_payload_bytes,
            metrics,
        }
    }

    /// Publish a payload to a topic
    pub fn publish(&self, topic: &str, payload: Bytes) -> BrokerResult<PublishResult> {
        match self.accept(topic, payload) {
            Ok(result) => {
                self.metrics.increment_messages_published();
                Ok(result)
            }
            Err(err) => {
                self.metrics.increment_publishes_rejected();
                tracing::debug!(
                    event = %Event::PublishRejected,
                    topic,
                    code = err.code(),
                    error = %err,
                    "publish rejected"
                );
                Err(err)
            }
        }
    }

    fn accept(&self, topic_name: &str, payload: Bytes) -> BrokerResult<PublishResult> {
        self.validate_payload(&payload)?;
        self.registry.validate_name(topic_name)?;

        let (topic, message) = self.registry.append_to(topic_name, payload)?;
        let accepted_subscriber_count = self.dispatcher.fan_out(&topic);

        tracing::trace!(
            topic = topic_name,
            sequence = message.sequence,
            subscribers = accepted_subscriber_count,
            "message published"
        );

        Ok(PublishResult {
            sequence: message.sequence,
            accepted_subscriber_count,
        })
    }

    fn validate_payload(&self, payload: &Bytes) -> BrokerResult<()> {
        if payload.is_empty() {
            return Err(BrokerError::EmptyMessage);
        }
        if payload.len() > self.max_payload_bytes {
            return Err(BrokerError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}
