//! # Subscription Management
//!
//! Subscriber records, delivery cursors, and the liveness state machine.
//!
//! Each subscriber is its own lock domain. The cursor is an atomic so status
//! snapshots can read it without taking the subscriber lock; it is only
//! written while that lock is held.
//!
//! Liveness: `active → idle → disconnected → removed`. Idle subscribers keep
//! their cursor and revive on activity. Disconnected subscribers keep their
//! cursor for the grace period so [`SubscriptionManager::resume`] continues
//! from the last acknowledged message.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::config::BrokerConfig;
use super::errors::{BrokerError, BrokerResult};
use super::topic::TopicRegistry;
use super::transport::{Transport, TransportKind};
use crate::observability::{Event, MetricsRegistry};

/// Unique subscriber ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an ID received from a client
    ///
    /// A malformed ID cannot name a subscriber, so it reports as not found.
    pub fn parse(s: &str) -> BrokerResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| BrokerError::SubscriberNotFound(s.to_string()))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Transport connected and receiving
    Active,
    /// No activity within the idle window
    Idle,
    /// Transport closed, retries exhausted, or liveness timeout exceeded
    Disconnected,
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Active => write!(f, "active"),
            Liveness::Idle => write!(f, "idle"),
            Liveness::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug)]
struct SubscriberState {
    transport: Transport,
    liveness: Liveness,
    last_activity: Instant,
    disconnected_at: Option<Instant>,
}

impl SubscriberState {
    fn mark_active(&mut self, now: Instant) {
        self.last_activity = now;
        if self.liveness == Liveness::Idle {
            self.liveness = Liveness::Active;
        }
    }
}

/// A subscriber record
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,

    /// Topic this subscriber is bound to
    topic: Arc<str>,

    /// Last delivered/acknowledged sequence
    cursor: AtomicU64,

    state: Mutex<SubscriberState>,

    created_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn liveness(&self) -> Liveness {
        self.state
            .lock()
            .map(|s| s.liveness)
            .unwrap_or(Liveness::Disconnected)
    }

    /// Current transport handle
    pub fn transport(&self) -> BrokerResult<Transport> {
        self.state
            .lock()
            .map(|s| s.transport.clone())
            .map_err(|_| BrokerError::poisoned())
    }

    fn info(&self, now: Instant) -> SubscriberInfo {
        let (liveness, idle_for, transport) = match self.state.lock() {
            Ok(s) => (
                s.liveness,
                now.saturating_duration_since(s.last_activity),
                s.transport.kind(),
            ),
            Err(_) => (Liveness::Disconnected, Duration::ZERO, TransportKind::Poll),
        };
        SubscriberInfo {
            id: self.id,
            topic: self.topic.to_string(),
            cursor: self.cursor(),
            liveness,
            idle_ms: idle_for.as_millis() as u64,
            transport,
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// Point-in-time view of a subscriber
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub topic: String,
    pub cursor: u64,
    pub liveness: Liveness,
    pub idle_ms: u64,
    pub transport: TransportKind,
    pub created_at: String,
}

impl SubscriberInfo {
    pub fn idle_for(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

/// Liveness transitions made by one sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Active → idle
    pub idled: Vec<SubscriberId>,
    /// Active/idle → disconnected
    pub disconnected: Vec<SubscriberId>,
    /// Removed after the grace period
    pub removed: Vec<SubscriberId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.idled.is_empty() && self.disconnected.is_empty() && self.removed.is_empty()
    }
}

/// Liveness windows
#[derive(Debug, Clone, Copy)]
pub struct LivenessWindows {
    pub idle_after: Duration,
    pub liveness_timeout: Duration,
    pub disconnect_grace: Duration,
}

impl From<&BrokerConfig> for LivenessWindows {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            idle_after: config.idle_after(),
            liveness_timeout: config.liveness_timeout(),
            disconnect_grace: config.disconnect_grace(),
        }
    }
}

/// Registry of subscribers
#[derive(Debug)]
pub struct SubscriptionManager {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
    registry: Arc<TopicRegistry>,
    windows: LivenessWindows,
    metrics: Arc<MetricsRegistry>,
}

impl SubscriptionManager {
    /// Create an empty manager
    pub fn new(
        registry: Arc<TopicRegistry>,
        windows: LivenessWindows,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            registry,
            windows,
            metrics,
        }
    }

    /// Subscribe to a topic, replaying from the oldest retained message
    pub fn subscribe(&self, topic: &str, transport: Transport) -> BrokerResult<SubscriberId> {
        self.register(topic, transport, None)
    }

    /// Subscribe to a topic, starting after `cursor` (0 replays everything retained)
    pub fn subscribe_from(
        &self,
        topic: &str,
        transport: Transport,
        cursor: u64,
    ) -> BrokerResult<SubscriberId> {
        self.register(topic, transport, Some(cursor))
    }

    fn register(
        &self,
        topic_name: &str,
        transport: Transport,
        start: Option<u64>,
    ) -> BrokerResult<SubscriberId> {
        let id = SubscriberId::new();
        let topic = self.registry.bind(topic_name, id)?;

        let head = topic.head();
        let cursor = match start {
            None => topic.replay_cursor(),
            Some(cursor) if cursor <= head => cursor,
            Some(cursor) => {
                self.registry.unbind(topic_name, &id);
                return Err(BrokerError::InvalidCursor {
                    requested: cursor,
                    current: 0,
                    head,
                });
            }
        };

        let subscriber = Arc::new(Subscriber {
            id,
            topic: Arc::from(topic.name()),
            cursor: AtomicU64::new(cursor),
            state: Mutex::new(SubscriberState {
                transport,
                liveness: Liveness::Active,
                last_activity: Instant::now(),
                disconnected_at: None,
            }),
            created_at: Utc::now(),
        });

        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|_| BrokerError::poisoned())?;
        subscribers.insert(id, subscriber);
        drop(subscribers);

        self.metrics.increment_subscribers_registered();
        tracing::info!(
            event = %Event::SubscriberRegistered,
            subscriber = %id,
            topic = topic_name,
            cursor,
            "subscriber registered"
        );

        Ok(id)
    }

    /// Remove a subscriber
    ///
    /// Idempotent: returns `false` when the subscriber was already gone.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.remove(id),
            Err(_) => return false,
        };

        let Some(subscriber) = removed else {
            return false;
        };

        if let Ok(transport) = subscriber.transport() {
            transport.close();
        }
        self.registry.unbind(&subscriber.topic, id);
        self.metrics.increment_subscribers_removed();
        tracing::info!(
            event = %Event::SubscriberRemoved,
            subscriber = %id,
            topic = %subscriber.topic,
            cursor = subscriber.cursor(),
            "subscriber removed"
        );
        true
    }

    /// Get a subscriber record
    pub fn get(&self, id: &SubscriberId) -> BrokerResult<Arc<Subscriber>> {
        let subscribers = self
            .subscribers
            .read()
            .map_err(|_| BrokerError::poisoned())?;
        subscribers
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SubscriberNotFound(id.to_string()))
    }

    /// Move a subscriber's cursor forward
    ///
    /// Fails with `InvalidCursor` if `sequence` is behind the current cursor
    /// or past the topic head. Advancing to the current cursor is a no-op.
    /// Counts as activity.
    pub fn advance_cursor(&self, id: &SubscriberId, sequence: u64) -> BrokerResult<()> {
        let subscriber = self.get(id)?;
        let head = self.registry.head(&subscriber.topic)?;

        let mut state = subscriber
            .state
            .lock()
            .map_err(|_| BrokerError::poisoned())?;

        let current = subscriber.cursor.load(Ordering::Acquire);
        if sequence < current || sequence > head {
            return Err(BrokerError::InvalidCursor {
                requested: sequence,
                current,
                head,
            });
        }

        subscriber.cursor.store(sequence, Ordering::Release);
        state.mark_active(Instant::now());
        Ok(())
    }

    /// Current cursor of a subscriber
    pub fn cursor(&self, id: &SubscriberId) -> BrokerResult<u64> {
        Ok(self.get(id)?.cursor())
    }

    /// Current liveness of a subscriber
    pub fn liveness(&self, id: &SubscriberId) -> BrokerResult<Liveness> {
        Ok(self.get(id)?.liveness())
    }

    /// Record consumer activity (heartbeat or poll)
    ///
    /// Revives an idle subscriber. A disconnected subscriber stays
    /// disconnected until it is resumed with a fresh transport.
    pub fn heartbeat(&self, id: &SubscriberId) -> BrokerResult<Liveness> {
        let subscriber = self.get(id)?;
        let mut state = subscriber
            .state
            .lock()
            .map_err(|_| BrokerError::poisoned())?;
        if state.liveness != Liveness::Disconnected {
            state.mark_active(Instant::now());
        }
        Ok(state.liveness)
    }

    /// Mark a subscriber disconnected, keeping its cursor
    pub fn mark_disconnected(&self, id: &SubscriberId, reason: &str) -> BrokerResult<()> {
        let subscriber = self.get(id)?;
        let mut state = subscriber
            .state
            .lock()
            .map_err(|_| BrokerError::poisoned())?;
        if state.liveness == Liveness::Disconnected {
            return Ok(());
        }
        state.liveness = Liveness::Disconnected;
        state.disconnected_at = Some(Instant::now());
        drop(state);

        self.metrics.increment_subscribers_disconnected();
        tracing::warn!(
            event = %Event::SubscriberDisconnected,
            subscriber = %id,
            topic = %subscriber.topic,
            cursor = subscriber.cursor(),
            reason,
            "subscriber disconnected"
        );
        Ok(())
    }

    /// Bind a fresh transport to an existing subscriber
    ///
    /// Delivery resumes after the preserved cursor. Fails once the
    /// subscriber has been removed.
    pub fn resume(&self, id: &SubscriberId, transport: Transport) -> BrokerResult<u64> {
        let subscriber = self.get(id)?;
        let mut state = subscriber
            .state
            .lock()
            .map_err(|_| BrokerError::poisoned())?;

        let previous = std::mem::replace(&mut state.transport, transport);
        previous.close();
        state.liveness = Liveness::Active;
        state.last_activity = Instant::now();
        state.disconnected_at = None;
        drop(state);

        let cursor = subscriber.cursor();
        tracing::info!(
            event = %Event::SubscriberResumed,
            subscriber = %id,
            topic = %subscriber.topic,
            cursor,
            "subscriber resumed"
        );
        Ok(cursor)
    }

    /// Evaluate every subscriber's liveness once
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for subscriber in self.all() {
            let Ok(mut state) = subscriber.state.lock() else {
                continue;
            };
            let idle_for = now.saturating_duration_since(state.last_activity);

            match state.liveness {
                Liveness::Active | Liveness::Idle => {
                    let reason = if state.transport.is_closed() {
                        Some("transport closed".to_string())
                    } else if idle_for >= self.windows.liveness_timeout {
                        Some(BrokerError::LivenessTimeout(subscriber.id.to_string()).to_string())
                    } else {
                        None
                    };

                    if let Some(reason) = reason {
                        state.liveness = Liveness::Disconnected;
                        state.disconnected_at = Some(now);
                        drop(state);
                        self.metrics.increment_subscribers_disconnected();
                        tracing::warn!(
                            event = %Event::SubscriberDisconnected,
                            subscriber = %subscriber.id,
                            topic = %subscriber.topic,
                            reason = %reason,
                            "subscriber disconnected"
                        );
                        report.disconnected.push(subscriber.id);
                    } else if state.liveness == Liveness::Active
                        && idle_for >= self.windows.idle_after
                    {
                        state.liveness = Liveness::Idle;
                        drop(state);
                        tracing::info!(
                            event = %Event::SubscriberIdle,
                            subscriber = %subscriber.id,
                            topic = %subscriber.topic,
                            idle_ms = idle_for.as_millis() as u64,
                            "subscriber idle"
                        );
                        report.idled.push(subscriber.id);
                    }
                }
                Liveness::Disconnected => {
                    let since = state.disconnected_at.unwrap_or(now);
                    if now.saturating_duration_since(since) >= self.windows.disconnect_grace {
                        drop(state);
                        if self.unsubscribe(&subscriber.id) {
                            report.removed.push(subscriber.id);
                        }
                    }
                }
            }
        }

        report
    }

    /// Snapshot of every subscriber record
    pub fn all(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .read()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Point-in-time views of every subscriber
    pub fn snapshot(&self, now: Instant) -> Vec<SubscriberInfo> {
        self.all().iter().map(|s| s.info(now)).collect()
    }

    /// Subscriber count
    pub fn len(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
