//! # Broker Status Reporter
//!
//! Read-only aggregation of registry and subscription state. Snapshots are
//! eventually consistent: heads and cursors are read from atomics and each
//! subscriber lock is held only long enough to copy its liveness, so
//! publishers are never blocked.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use super::subscription::{Liveness, SubscriptionManager};
use super::topic::TopicRegistry;

/// Overall broker health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Degraded => write!(f, "degraded"),
        }
    }
}

/// Per-topic status
#[derive(Debug, Clone, Serialize)]
pub struct TopicStatus {
    pub name: String,
    pub head: u64,
    /// Head minus the slowest subscriber's cursor
    pub backlog: u64,
    pub subscribers: usize,
    pub over_threshold: bool,
}

/// Point-in-time broker status
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub health: Health,
    pub topic_count: usize,
    pub subscriber_count: usize,
    pub active_subscribers: usize,
    pub idle_subscribers: usize,
    pub disconnected_subscribers: usize,
    /// Subscribers idle past the grace window
    pub stale_subscribers: usize,
    pub topics_over_threshold: usize,
    pub backlog_threshold: u64,
    pub topics: Vec<TopicStatus>,
    pub generated_at: String,
}

impl BrokerStatus {
    pub fn is_healthy(&self) -> bool {
        self.health == Health::Healthy
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        if self.is_healthy() {
            return Health::Healthy.to_string();
        }

        let mut reasons = Vec::new();
        if self.stale_subscribers > 0 {
            reasons.push(format!(
                "{} {} idle",
                self.stale_subscribers,
                plural(self.stale_subscribers, "subscriber", "subscribers")
            ));
        }
        if self.topics_over_threshold > 0 {
            reasons.push(format!(
                "{} {} over backlog threshold",
                self.topics_over_threshold,
                plural(self.topics_over_threshold, "topic", "topics")
            ));
        }
        format!("{}: {}", Health::Degraded, reasons.join(", "))
    }
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Builds [`BrokerStatus`] snapshots
#[derive(Debug)]
pub struct StatusReporter {
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    backlog_threshold: u64,
    idle_grace: Duration,
}

impl StatusReporter {
    pub fn new(
        registry: Arc<TopicRegistry>,
        subscriptions: Arc<SubscriptionManager>,
        backlog_threshold: u64,
        idle_grace: Duration,
    ) -> Self {
        Self {
            registry,
            subscriptions,
            backlog_threshold,
            idle_grace,
        }
    }

    /// Current status
    pub fn snapshot(&self) -> BrokerStatus {
        self.snapshot_at(Instant::now())
    }

    /// Status as of `now`
    pub fn snapshot_at(&self, now: Instant) -> BrokerStatus {
        let subscribers = self.subscriptions.snapshot(now);

        let mut min_cursor: HashMap<&str, u64> = HashMap::new();
        let (mut active, mut idle, mut disconnected, mut stale) = (0, 0, 0, 0);
        for info in &subscribers {
            min_cursor
                .entry(info.topic.as_str())
                .and_modify(|c| *c = (*c).min(info.cursor))
                .or_insert(info.cursor);

            match info.liveness {
                Liveness::Active => active += 1,
                Liveness::Idle => idle += 1,
                Liveness::Disconnected => disconnected += 1,
            }
            if info.liveness != Liveness::Disconnected && info.idle_for() > self.idle_grace {
                stale += 1;
            }
        }

        let mut topics: Vec<TopicStatus> = self
            .registry
            .topics()
            .iter()
            .map(|topic| {
                let head = topic.head();
                let backlog = min_cursor
                    .get(topic.name())
                    .map(|cursor| head.saturating_sub(*cursor))
                    .unwrap_or(0);
                TopicStatus {
                    name: topic.name().to_string(),
                    head,
                    backlog,
                    subscribers: topic.subscriber_count(),
                    over_threshold: backlog > self.backlog_threshold,
                }
            })
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        let topics_over_threshold = topics.iter().filter(|t| t.over_threshold).count();
        let health = if topics_over_threshold > 0 || stale > 0 {
            Health::Degraded
        } else {
            Health::Healthy
        };

        BrokerStatus {
            health,
            topic_count: topics.len(),
            subscriber_count: subscribers.len(),
            active_subscribers: active,
            idle_subscribers: idle,
            disconnected_subscribers: disconnected,
            stale_subscribers: stale,
            topics_over_threshold,
            backlog_threshold: self.backlog_threshold,
            topics,
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    /// One-line status string
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::subscription::LivenessWindows;
    use crate::broker::transport::Transport;
    use crate::observability::MetricsRegistry;
    use bytes::Bytes;

    fn setup(threshold: u64) -> (Arc<TopicRegistry>, Arc<SubscriptionManager>, StatusReporter) {
        let metrics = Arc::new(MetricsRegistry::new());
        let registry = Arc::new(TopicRegistry::new(true, 1000, 256, Arc::clone(&metrics)));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&registry),
            LivenessWindows {
                idle_after: Duration::from_secs(30),
                liveness_timeout: Duration::from_secs(300),
                disconnect_grace: Duration::from_secs(60),
            },
            metrics,
        ));
        let reporter = StatusReporter::new(
            Arc::clone(&registry),
            Arc::clone(&subscriptions),
            threshold,
            Duration::from_secs(120),
        );
        (registry, subscriptions, reporter)
    }

    #[test]
    fn test_empty_broker_is_healthy() {
        let (_registry, _subs, reporter) = setup(10);
        let status = reporter.snapshot();

        assert_eq!(status.health, Health::Healthy);
        assert_eq!(status.topic_count, 0);
        assert_eq!(reporter.summary(), "healthy");
    }

    #[test]
    fn test_backlog_uses_slowest_cursor() {
        let (registry, subs, reporter) = setup(10);
        let (t1, _b1) = Transport::poll(8);
        let (t2, _b2) = Transport::poll(8);
        let fast = subs.subscribe("news", t1).unwrap();
        subs.subscribe("news", t2).unwrap();
        for _ in 0..5 {
            registry.append("news", Bytes::from_static(b"x")).unwrap();
        }
        subs.advance_cursor(&fast, 5).unwrap();

        let status = reporter.snapshot();
        assert_eq!(status.topics[0].head, 5);
        assert_eq!(status.topics[0].backlog, 5);
        assert!(status.is_healthy());
    }

    #[test]
    fn test_topic_without_subscribers_has_no_backlog() {
        let (registry, _subs, reporter) = setup(1);
        for _ in 0..5 {
            registry.append("quiet", Bytes::from_static(b"x")).unwrap();
        }

        let status = reporter.snapshot();
        assert_eq!(status.topics[0].backlog, 0);
        assert!(status.is_healthy());
    }

    #[test]
    fn test_backlog_over_threshold_degrades() {
        let (registry, subs, reporter) = setup(2);
        let (transport, _buffer) = Transport::poll(8);
        subs.subscribe("news", transport).unwrap();
        for _ in 0..3 {
            registry.append("news", Bytes::from_static(b"x")).unwrap();
        }

        let status = reporter.snapshot();
        assert_eq!(status.health, Health::Degraded);
        assert_eq!(status.summary(), "degraded: 1 topic over backlog threshold");
    }

    #[test]
    fn test_idle_past_grace_degrades() {
        let (_registry, subs, reporter) = setup(10);
        let (t1, _b1) = Transport::poll(8);
        let (t2, _b2) = Transport::poll(8);
        subs.subscribe("a", t1).unwrap();
        subs.subscribe("b", t2).unwrap();

        let status = reporter.snapshot_at(Instant::now() + Duration::from_secs(121));
        assert_eq!(status.stale_subscribers, 2);
        assert_eq!(status.summary(), "degraded: 2 subscribers idle");
    }
}
