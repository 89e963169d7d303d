//! Metrics registry for AeroMQ
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-free

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics registry containing all broker counters
///
/// # Thread Safety
///
/// All counters use atomic operations for thread-safe increments.
/// Uses Relaxed ordering for minimal overhead (eventual consistency is fine for metrics).
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Messages accepted into a topic log
    messages_published: AtomicU64,
    /// Publish requests rejected by validation
    publishes_rejected: AtomicU64,
    /// Messages written to a subscriber transport
    messages_delivered: AtomicU64,
    /// Transport writes retried
    delivery_retries: AtomicU64,
    /// Deliveries abandoned after the retry ceiling
    delivery_failures: AtomicU64,
    /// Subscribers registered
    subscribers_registered: AtomicU64,
    /// Subscribers marked disconnected
    subscribers_disconnected: AtomicU64,
    /// Subscribers removed
    subscribers_removed: AtomicU64,
    /// Topics created
    topics_created: AtomicU64,
    /// Topics removed by retention
    topics_expired: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Publish metrics

    pub fn increment_messages_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_publishes_rejected(&self) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Delivery metrics

    pub fn increment_messages_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_retries(&self) {
        self.delivery_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Subscriber metrics

    pub fn increment_subscribers_registered(&self) {
        self.subscribers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_subscribers_disconnected(&self) {
        self.subscribers_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_subscribers_removed(&self) {
        self.subscribers_removed.fetch_add(1, Ordering::Relaxed);
    }

    // Topic metrics

    pub fn increment_topics_created(&self) {
        self.topics_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_topics_expired(&self) {
        self.topics_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            subscribers_registered: self.subscribers_registered.load(Ordering::Relaxed),
            subscribers_disconnected: self.subscribers_disconnected.load(Ordering::Relaxed),
            subscribers_removed: self.subscribers_removed.load(Ordering::Relaxed),
            topics_created: self.topics_created.load(Ordering::Relaxed),
            topics_expired: self.topics_expired.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_published: u64,
    pub publishes_rejected: u64,
    pub messages_delivered: u64,
    pub delivery_retries: u64,
    pub delivery_failures: u64,
    pub subscribers_registered: u64,
    pub subscribers_disconnected: u64,
    pub subscribers_removed: u64,
    pub topics_created: u64,
    pub topics_expired: u64,
}
