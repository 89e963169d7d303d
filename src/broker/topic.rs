//! # Topic Registry
//!
//! Owns every topic and its message log.
//!
//! Each topic is its own lock domain: appends to one topic never contend with
//! appends to another. The registry map lock is held only long enough to look
//! up or insert a topic handle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use super::errors::{BrokerError, BrokerResult};
use super::message::Message;
use super::subscription::SubscriberId;
use crate::observability::{Event, MetricsRegistry};

/// Messages fetched per lock acquisition by a [`TopicReader`]
const READ_BATCH: usize = 64;

/// Append-only log guarded by the topic lock
#[derive(Debug)]
struct TopicLog {
    messages: VecDeque<Message>,
    next_sequence: u64,
}

/// A named channel with its message log and bound subscribers
#[derive(Debug)]
pub struct Topic {
    name: Arc<str>,

    /// Per-topic append lock
    log: Mutex<TopicLog>,

    /// Last assigned sequence, readable without the append lock
    head: AtomicU64,

    /// Wakes dispatch units after an append
    head_tx: watch::Sender<u64>,

    subscribers: RwLock<HashSet<SubscriberId>>,

    max_messages: usize,

    last_activity: Mutex<Instant>,

    created_at: DateTime<Utc>,
}

impl Topic {
    fn new(name: Arc<str>, max_messages: usize) -> Self {
        let (head_tx, _) = watch::channel(0);
        Self {
            name,
            log: Mutex::new(TopicLog {
                messages: VecDeque::new(),
                next_sequence: 1,
            }),
            head: AtomicU64::new(0),
            head_tx,
            subscribers: RwLock::new(HashSet::new()),
            max_messages,
            last_activity: Mutex::new(Instant::now()),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Highest sequence appended so far (0 for an empty topic)
    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a payload, assigning the next sequence number
    ///
    /// # Panics
    ///
    /// Panics if the sequence counter and the published head disagree. That
    /// can only happen through memory corruption or a logic bug and the log
    /// can no longer be trusted.
    fn append(&self, payload: Bytes) -> BrokerResult<Message> {
        let message = {
            let mut log = self.log.lock().map_err(|_| BrokerError::poisoned())?;

            let sequence = log.next_sequence;
            let head = self.head.load(Ordering::Acquire);
            if sequence != head + 1 {
                tracing::error!(
                    event = %Event::SequenceCorruption,
                    topic = %self.name,
                    next = sequence,
                    head,
                    "sequence counter corrupted"
                );
                panic!(
                    "corrupted sequence counter for topic {}: next={} head={}",
                    self.name, sequence, head
                );
            }

            let message = Message::new(Arc::clone(&self.name), payload, sequence);
            log.messages.push_back(message.clone());
            log.next_sequence = sequence + 1;

            // Trim if over capacity
            while log.messages.len() > self.max_messages {
                log.messages.pop_front();
            }

            self.head.store(sequence, Ordering::Release);
            message
        };

        let sequence = message.sequence;
        self.head_tx.send_if_modified(|current| {
            if sequence > *current {
                *current = sequence;
                true
            } else {
                false
            }
        });
        self.touch();

        Ok(message)
    }

    /// Up to `limit` retained messages with sequence in `(since, until]`
    fn messages_between(&self, since: u64, until: u64, limit: usize) -> Vec<Message> {
        let Ok(log) = self.log.lock() else {
            return Vec::new();
        };
        let start = log.messages.partition_point(|m| m.sequence <= since);
        log.messages
            .iter()
            .skip(start)
            .take_while(|m| m.sequence <= until)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of messages currently retained
    pub fn retained(&self) -> usize {
        self.log.lock().map(|log| log.messages.len()).unwrap_or(0)
    }

    /// Sequence of the oldest retained message, if any
    pub fn first_retained(&self) -> Option<u64> {
        self.log
            .lock()
            .ok()
            .and_then(|log| log.messages.front().map(|m| m.sequence))
    }

    /// Cursor that replays every retained message
    pub fn replay_cursor(&self) -> u64 {
        match self.first_retained() {
            Some(first) => first - 1,
            None => self.head(),
        }
    }

    /// Wake-up channel carrying the head sequence
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }

    fn add_subscriber(&self, id: SubscriberId) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.insert(id);
        }
    }

    fn remove_subscriber(&self, id: &SubscriberId) -> bool {
        self.subscribers
            .write()
            .map(|mut subs| subs.remove(id))
            .unwrap_or(false)
    }

    /// IDs of the subscribers bound to this topic
    pub fn subscribers(&self) -> Vec<SubscriberId> {
        self.subscribers
            .read()
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|subs| subs.len()).unwrap_or(0)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        self.last_activity
            .lock()
            .map(|last| now.saturating_duration_since(*last))
            .unwrap_or_default()
    }

    /// Point-in-time summary
    pub fn info(&self) -> TopicInfo {
        TopicInfo {
            name: self.name.to_string(),
            head: self.head(),
            retained: self.retained(),
            first_retained: self.first_retained(),
            subscribers: self.subscriber_count(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// Summary of a topic
#[derive(Debug, Clone, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub head: u64,
    pub retained: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_retained: Option<u64>,
    pub subscribers: usize,
    pub created_at: String,
}

/// Lazy, finite reader over a topic log
///
/// Yields messages with sequence greater than the starting point, up to the
/// head observed when the reader was created. The topic lock is taken once
/// per batch, never across items. Restart by creating a new reader from the
/// last sequence seen.
#[derive(Debug)]
pub struct TopicReader {
    topic: Arc<Topic>,
    position: u64,
    until: u64,
    buffer: VecDeque<Message>,
}

impl TopicReader {
    fn new(topic: Arc<Topic>, since: u64) -> Self {
        let until = topic.head();
        Self {
            topic,
            position: since,
            until,
            buffer: VecDeque::new(),
        }
    }

    /// Sequence of the last message yielded (or the starting point)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Head bound of this reader
    pub fn until(&self) -> u64 {
        self.until
    }
}

impl Iterator for TopicReader {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.buffer.is_empty() {
            if self.position >= self.until {
                return None;
            }
            self.buffer
                .extend(self.topic.messages_between(self.position, self.until, READ_BATCH));
        }

        let message = self.buffer.pop_front()?;
        self.position = message.sequence;
        Some(message)
    }
}

/// Registry of all topics
#[derive(Debug)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<Arc<str>, Arc<Topic>>>,

    /// Create topics on first use
    auto_create: bool,

    /// Ring buffer size per topic
    max_messages: usize,

    max_name_len: usize,

    metrics: Arc<MetricsRegistry>,
}

impl TopicRegistry {
    /// Create an empty registry
    pub fn new(
        auto_create: bool,
        max_messages: usize,
        max_name_len: usize,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            auto_create,
            max_messages: max_messages.max(1),
            max_name_len,
            metrics,
        }
    }

    /// Validate a topic name
    pub fn validate_name(&self, name: &str) -> BrokerResult<()> {
        if name.trim().is_empty() {
            return Err(BrokerError::InvalidTopic("topic name must not be empty".into()));
        }
        if name.len() > self.max_name_len {
            return Err(BrokerError::InvalidTopic(format!(
                "topic name exceeds {} bytes",
                self.max_name_len
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(BrokerError::InvalidTopic(
                "topic name contains control characters".into(),
            ));
        }
        Ok(())
    }

    /// Get an existing topic
    pub fn get_topic(&self, name: &str) -> BrokerResult<Arc<Topic>> {
        let topics = self.topics.read().map_err(|_| BrokerError::poisoned())?;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))
    }

    /// Get a topic, creating it on first use
    ///
    /// Creation is always allowed here; implicit creation from publish and
    /// subscribe is gated separately by `auto_create`.
    pub fn get_or_create_topic(&self, name: &str) -> BrokerResult<Arc<Topic>> {
        self.validate_name(name)?;
        if let Ok(topic) = self.get_topic(name) {
            return Ok(topic);
        }

        let mut topics = self.topics.write().map_err(|_| BrokerError::poisoned())?;
        Ok(self.insert_locked(&mut topics, name))
    }

    /// Lookup or insert while holding the write lock
    fn insert_locked(&self, topics: &mut HashMap<Arc<str>, Arc<Topic>>, name: &str) -> Arc<Topic> {
        if let Some(topic) = topics.get(name) {
            return Arc::clone(topic);
        }
        let key: Arc<str> = Arc::from(name);
        let topic = Arc::new(Topic::new(Arc::clone(&key), self.max_messages));
        topics.insert(key, Arc::clone(&topic));

        self.metrics.increment_topics_created();
        tracing::info!(event = %Event::TopicCreated, topic = name, "topic created");
        topic
    }

    /// Topic for an implicit operation (publish or subscribe)
    fn resolve(&self, name: &str) -> BrokerResult<Arc<Topic>> {
        if self.auto_create {
            self.get_or_create_topic(name)
        } else {
            self.validate_name(name)?;
            self.get_topic(name)
        }
    }

    /// Append a payload to a topic
    pub fn append(&self, name: &str, payload: Bytes) -> BrokerResult<Message> {
        self.append_to(name, payload).map(|(_, message)| message)
    }

    /// Append a payload and return the topic it landed in
    ///
    /// The handle stays valid even if the topic is removed from the registry
    /// right after the append.
    pub fn append_to(&self, name: &str, payload: Bytes) -> BrokerResult<(Arc<Topic>, Message)> {
        let topic = self.resolve(name)?;
        let message = topic.append(payload)?;
        Ok((topic, message))
    }

    /// Messages after `since`, up to the current head
    pub fn read_since(&self, name: &str, since: u64) -> BrokerResult<TopicReader> {
        Ok(TopicReader::new(self.get_topic(name)?, since))
    }

    /// Current head of a topic
    pub fn head(&self, name: &str) -> BrokerResult<u64> {
        Ok(self.get_topic(name)?.head())
    }

    /// Wake-up channel for a topic
    pub fn watch(&self, name: &str) -> BrokerResult<watch::Receiver<u64>> {
        Ok(self.get_topic(name)?.watch())
    }

    /// Bind a subscriber to a topic, creating the topic if allowed
    ///
    /// The lookup and the bind happen under the registry lock so a topic
    /// cannot be expired between the two.
    pub fn bind(&self, name: &str, id: SubscriberId) -> BrokerResult<Arc<Topic>> {
        self.validate_name(name)?;
        {
            let topics = self.topics.read().map_err(|_| BrokerError::poisoned())?;
            if let Some(topic) = topics.get(name) {
                topic.add_subscriber(id);
                topic.touch();
                return Ok(Arc::clone(topic));
            }
        }

        if !self.auto_create {
            return Err(BrokerError::UnknownTopic(name.to_string()));
        }

        let mut topics = self.topics.write().map_err(|_| BrokerError::poisoned())?;
        let topic = self.insert_locked(&mut topics, name);
        topic.add_subscriber(id);
        Ok(topic)
    }

    /// Unbind a subscriber from a topic
    pub fn unbind(&self, name: &str, id: &SubscriberId) -> bool {
        match self.get_topic(name) {
            Ok(topic) => {
                let removed = topic.remove_subscriber(id);
                topic.touch();
                removed
            }
            Err(_) => false,
        }
    }

    /// Snapshot of all topic handles
    pub fn topics(&self) -> Vec<Arc<Topic>> {
        self.topics
            .read()
            .map(|topics| topics.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorted topic names
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .topics
            .read()
            .map(|topics| topics.keys().map(|k| k.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of topics
    pub fn len(&self) -> usize {
        self.topics.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administratively remove a topic without subscribers
    pub fn remove_topic(&self, name: &str) -> BrokerResult<()> {
        let mut topics = self.topics.write().map_err(|_| BrokerError::poisoned())?;
        let topic = topics
            .get(name)
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))?;
        if topic.subscriber_count() > 0 {
            return Err(BrokerError::TopicInUse(name.to_string()));
        }
        topics.remove(name);
        tracing::info!(event = %Event::TopicRemoved, topic = name, "topic removed");
        Ok(())
    }

    /// Remove topics without subscribers idle for at least `retention`
    ///
    /// Returns the names of the removed topics.
    pub fn expire_idle_topics(&self, now: Instant, retention: Duration) -> Vec<String> {
        let Ok(mut topics) = self.topics.write() else {
            return Vec::new();
        };

        let expired: Vec<Arc<str>> = topics
            .iter()
            .filter(|(_, t)| t.subscriber_count() == 0 && t.idle_for(now) >= retention)
            .map(|(k, _)| Arc::clone(k))
            .collect();

        for name in &expired {
            topics.remove(name);
            self.metrics.increment_topics_expired();
            tracing::info!(event = %Event::TopicExpired, topic = %name, "topic expired");
        }

        expired.iter().map(|n| n.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TopicRegistry {
        TopicRegistry::new(true, 10_000, 256, Arc::new(MetricsRegistry::new()))
    }

    fn payload(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_sequence_numbers_increment() {
        let registry = registry();

        let m1 = registry.append("news", payload("a")).unwrap();
        let m2 = registry.append("news", payload("b")).unwrap();
        let m3 = registry.append("news", payload("c")).unwrap();

        assert_eq!(m1.sequence, 1);
        assert_eq!(m2.sequence, 2);
        assert_eq!(m3.sequence, 3);
        assert_eq!(registry.head("news").unwrap(), 3);
    }

    #[test]
    fn test_topics_are_independent() {
        let registry = registry();

        registry.append("news", payload("a")).unwrap();
        registry.append("news", payload("b")).unwrap();
        let other = registry.append("sports", payload("c")).unwrap();

        assert_eq!(other.sequence, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_read_since() {
        let registry = registry();
        for p in ["1", "2", "3"] {
            registry.append("news", payload(p)).unwrap();
        }

        let messages: Vec<_> = registry.read_since("news", 1).unwrap().collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence, 2);
        assert_eq!(messages[1].sequence, 3);
    }

    #[test]
    fn test_reader_is_bounded_by_head_at_creation() {
        let registry = registry();
        registry.append("news", payload("1")).unwrap();

        let reader = registry.read_since("news", 0).unwrap();
        registry.append("news", payload("2")).unwrap();

        let sequences: Vec<u64> = reader.map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1]);
    }

    #[test]
    fn test_reader_spans_multiple_batches() {
        let registry = registry();
        for _ in 0..(READ_BATCH * 2 + 5) {
            registry.append("bulk", payload("x")).unwrap();
        }

        let sequences: Vec<u64> = registry
            .read_since("bulk", 0)
            .unwrap()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(sequences.len(), READ_BATCH * 2 + 5);
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_ring_buffer_capacity() {
        let registry = TopicRegistry::new(true, 5, 256, Arc::new(MetricsRegistry::new()));
        for _ in 0..10 {
            registry.append("news", payload("x")).unwrap();
        }

        let topic = registry.get_topic("news").unwrap();
        assert_eq!(topic.retained(), 5);
        assert_eq!(topic.first_retained(), Some(6));

        // A reader from before the trim point resumes at the first retained message
        let messages: Vec<_> = registry.read_since("news", 2).unwrap().collect();
        assert_eq!(messages[0].sequence, 6);
        assert_eq!(messages[4].sequence, 10);
    }

    #[test]
    fn test_unknown_topic_when_auto_create_disabled() {
        let registry = TopicRegistry::new(false, 100, 256, Arc::new(MetricsRegistry::new()));

        let err = registry.append("missing", payload("x")).unwrap_err();
        assert_eq!(err, BrokerError::UnknownTopic("missing".into()));

        registry.get_or_create_topic("present").unwrap();
        assert!(registry.append("present", payload("x")).is_ok());
    }

    #[test]
    fn test_invalid_topic_names() {
        let registry = registry();
        assert!(matches!(
            registry.append("   ", payload("x")),
            Err(BrokerError::InvalidTopic(_))
        ));
        assert!(matches!(
            registry.append("bad\nname", payload("x")),
            Err(BrokerError::InvalidTopic(_))
        ));
        let long = "x".repeat(300);
        assert!(matches!(
            registry.append(&long, payload("x")),
            Err(BrokerError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_bind_and_unbind() {
        let registry = registry();
        let id = SubscriberId::new();

        let topic = registry.bind("news", id).unwrap();
        assert_eq!(topic.subscribers(), vec![id]);

        assert!(registry.unbind("news", &id));
        assert!(!registry.unbind("news", &id));
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn test_remove_topic_in_use() {
        let registry = registry();
        let id = SubscriberId::new();
        registry.bind("news", id).unwrap();

        assert_eq!(
            registry.remove_topic("news"),
            Err(BrokerError::TopicInUse("news".into()))
        );

        registry.unbind("news", &id);
        registry.remove_topic("news").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expire_idle_topics() {
        let registry = registry();
        registry.append("stale", payload("x")).unwrap();
        registry.bind("watched", SubscriberId::new()).unwrap();

        let later = Instant::now() + Duration::from_secs(120);
        let expired = registry.expire_idle_topics(later, Duration::from_secs(60));

        assert_eq!(expired, vec!["stale".to_string()]);
        assert_eq!(registry.topic_names(), vec!["watched".to_string()]);
    }

    #[test]
    fn test_append_to_returns_topic_after_expiry() {
        let registry = registry();
        let (topic, message) = registry.append_to("news", payload("x")).unwrap();

        // Expired between the append and the fan-out
        let later = Instant::now() + Duration::from_secs(120);
        registry.expire_idle_topics(later, Duration::from_secs(60));
        assert!(registry.get_topic("news").is_err());

        assert_eq!(topic.name(), "news");
        assert_eq!(topic.head(), message.sequence);
    }

    #[test]
    fn test_replay_cursor_tracks_retention() {
        let registry = TopicRegistry::new(true, 2, 256, Arc::new(MetricsRegistry::new()));
        let topic = registry.get_or_create_topic("news").unwrap();
        assert_eq!(topic.replay_cursor(), 0);

        for p in ["a", "b", "c", "d"] {
            registry.append("news", payload(p)).unwrap();
        }
        assert_eq!(topic.replay_cursor(), 2);
    }

    #[tokio::test]
    async fn test_watch_wakes_on_append() {
        let registry = registry();
        let topic = registry.get_or_create_topic("news").unwrap();
        let mut rx = topic.watch();

        registry.append("news", payload("x")).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
