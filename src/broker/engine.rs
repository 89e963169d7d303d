//! # Broker
//!
//! Owns one instance of every broker component and the background liveness
//! sweeper. The HTTP layer and tests talk to the broker only through this
//! type. A broker starts empty; build a fresh one per test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::BrokerConfig;
use super::dispatcher::{DeliveryDispatcher, DispatchSettings};
use super::errors::{BrokerError, BrokerResult};
use super::message::Message;
use super::publish::{PublishPipeline, PublishResult};
use super::status::{BrokerStatus, StatusReporter};
use super::subscription::{
    Liveness, LivenessWindows, SubscriberId, SubscriberInfo, SubscriptionManager, SweepReport,
};
use super::topic::{TopicInfo, TopicRegistry};
use super::transport::{PollBuffer, PushReceiver, Transport};
use crate::observability::{Event, MetricsRegistry};

/// Running sweeper task
#[derive(Debug)]
struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// In-memory publish/subscribe broker
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    metrics: Arc<MetricsRegistry>,
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    dispatcher: Arc<DeliveryDispatcher>,
    publisher: PublishPipeline,
    status: StatusReporter,

    /// Consumer side of poll transports, for subscribers created over HTTP
    poll_buffers: RwLock<HashMap<SubscriberId, PollBuffer>>,

    sweeper: Mutex<Option<Sweeper>>,
}

impl Broker {
    /// Build an empty broker
    ///
    /// Delivery tasks run on the tokio runtime current here. A broker built
    /// outside any runtime can only deliver when called from inside one;
    /// otherwise subscribing fails with `Internal`.
    pub fn new(config: BrokerConfig) -> BrokerResult<Arc<Self>> {
        config.validate()?;

        let metrics = Arc::new(MetricsRegistry::new());
        let registry = Arc::new(TopicRegistry::new(
            config.auto_create_topics,
            config.max_messages_per_topic,
            config.max_topic_name_len,
            Arc::clone(&metrics),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&registry),
            LivenessWindows::from(&config),
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&subscriptions),
            DispatchSettings::from(&config.delivery),
            Arc::clone(&metrics),
        ));
        let publisher = PublishPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            config.max_payload_bytes,
            Arc::clone(&metrics),
        );
        let status = StatusReporter::new(
            Arc::clone(&registry),
            Arc::clone(&subscriptions),
            config.backlog_threshold,
            config.idle_grace(),
        );

        Ok(Arc::new(Self {
            config,
            metrics,
            registry,
            subscriptions,
            dispatcher,
            publisher,
            status,
            poll_buffers: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }))
    }

    /// Spawn the liveness sweeper
    ///
    /// Calling `start` on a running broker is a no-op. The sweeper holds a
    /// weak reference and exits once the broker is dropped.
    pub fn start(self: &Arc<Self>) -> BrokerResult<()> {
        let mut sweeper = self.sweeper.lock().map_err(|_| BrokerError::poisoned())?;
        if sweeper.is_some() {
            return Ok(());
        }

        let runtime = self.dispatcher.runtime()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_sweeper(
            Arc::downgrade(self),
            self.config.sweep_interval(),
            shutdown_rx,
        ));
        *sweeper = Some(Sweeper {
            shutdown: shutdown_tx,
            handle,
        });

        tracing::info!(
            event = %Event::BrokerStart,
            sweep_interval_ms = self.config.sweep_interval_ms,
            "broker started"
        );
        Ok(())
    }

    /// Stop the sweeper and every dispatch unit
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().ok().and_then(|mut s| s.take());
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);
            let _ = sweeper.handle.await;
        }
        self.dispatcher.shutdown();
        tracing::info!(event = %Event::BrokerStop, "broker stopped");
    }

    /// Run one liveness pass
    ///
    /// Stops dispatch for disconnected subscribers, forgets removed ones and
    /// expires idle topics when retention is configured.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let report = self.subscriptions.sweep(now);

        for id in report.disconnected.iter().chain(&report.removed) {
            self.dispatcher.stop(id);
        }
        if !report.removed.is_empty() {
            if let Ok(mut buffers) = self.poll_buffers.write() {
                for id in &report.removed {
                    buffers.remove(id);
                }
            }
        }
        self.dispatcher.prune_finished();

        if let Some(retention) = self.config.topic_retention() {
            self.registry.expire_idle_topics(now, retention);
        }

        if !report.is_empty() {
            tracing::debug!(
                idled = report.idled.len(),
                disconnected = report.disconnected.len(),
                removed = report.removed.len(),
                "liveness sweep"
            );
        }
        report
    }

    // ==================
    // Publish
    // ==================

    /// Publish a payload to a topic
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> BrokerResult<PublishResult> {
        self.publisher.publish(topic, payload.into())
    }

    /// Topic used when a publish request names none
    pub fn default_topic(&self) -> &str {
        &self.config.default_topic
    }

    // ==================
    // Subscribe
    // ==================

    /// Subscribe with a caller-provided transport
    ///
    /// Delivery replays every retained message, then follows new ones.
    pub fn subscribe(&self, topic: &str, transport: Transport) -> BrokerResult<SubscriberId> {
        let id = self.subscriptions.subscribe(topic, transport)?;
        self.start_dispatch(id)?;
        Ok(id)
    }

    /// Subscribe starting after `cursor`
    pub fn subscribe_from(
        &self,
        topic: &str,
        transport: Transport,
        cursor: u64,
    ) -> BrokerResult<SubscriberId> {
        let id = self.subscriptions.subscribe_from(topic, transport, cursor)?;
        self.start_dispatch(id)?;
        Ok(id)
    }

    /// Subscribe over a push channel
    pub fn subscribe_push(&self, topic: &str) -> BrokerResult<(SubscriberId, PushReceiver)> {
        let (transport, rx) = Transport::push(self.config.push_channel_capacity);
        let id = self.subscribe(topic, transport)?;
        Ok((id, rx))
    }

    /// Subscribe over a poll buffer drained with [`Broker::poll`]
    pub fn subscribe_poll(&self, topic: &str) -> BrokerResult<SubscriberId> {
        let (transport, buffer) = Transport::poll(self.config.poll_buffer_capacity);
        let id = self.subscriptions.subscribe(topic, transport)?;
        self.poll_buffers
            .write()
            .map_err(|_| BrokerError::poisoned())?
            .insert(id, buffer);
        self.start_dispatch(id)?;
        Ok(id)
    }

    fn start_dispatch(&self, id: SubscriberId) -> BrokerResult<()> {
        if let Err(err) = self.dispatcher.start(id) {
            self.unsubscribe(&id);
            return Err(err);
        }
        Ok(())
    }

    /// Remove a subscriber; idempotent
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.dispatcher.stop(id);
        if let Ok(mut buffers) = self.poll_buffers.write() {
            buffers.remove(id);
        }
        self.subscriptions.unsubscribe(id)
    }

    /// Bind a fresh transport to an existing subscriber and restart delivery
    ///
    /// Returns the cursor delivery resumes after.
    pub fn resume(&self, id: &SubscriberId, transport: Transport) -> BrokerResult<u64> {
        self.dispatcher.stop(id);
        let cursor = self.subscriptions.resume(id, transport)?;
        self.dispatcher.start(*id)?;
        Ok(cursor)
    }

    /// Resume over a new push channel
    pub fn resume_push(&self, id: &SubscriberId) -> BrokerResult<(u64, PushReceiver)> {
        let (transport, rx) = Transport::push(self.config.push_channel_capacity);
        let cursor = self.resume(id, transport)?;
        Ok((cursor, rx))
    }

    /// Resume over a new poll buffer
    pub fn resume_poll(&self, id: &SubscriberId) -> BrokerResult<u64> {
        let (transport, buffer) = Transport::poll(self.config.poll_buffer_capacity);
        self.dispatcher.stop(id);
        let cursor = self.subscriptions.resume(id, transport)?;
        self.poll_buffers
            .write()
            .map_err(|_| BrokerError::poisoned())?
            .insert(*id, buffer);
        self.dispatcher.start(*id)?;
        Ok(cursor)
    }

    /// Record consumer activity
    pub fn heartbeat(&self, id: &SubscriberId) -> BrokerResult<Liveness> {
        self.subscriptions.heartbeat(id)
    }

    /// Drain up to `max` messages buffered for a poll subscriber
    ///
    /// Counts as activity.
    pub fn poll(&self, id: &SubscriberId, max: Option<usize>) -> BrokerResult<Vec<Message>> {
        let buffer = self
            .poll_buffers
            .read()
            .map_err(|_| BrokerError::poisoned())?
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SubscriberNotFound(id.to_string()))?;

        self.subscriptions.heartbeat(id)?;
        Ok(match max {
            Some(max) => buffer.drain_up_to(max),
            None => buffer.drain(),
        })
    }

    // ==================
    // Introspection
    // ==================

    /// Current broker status
    pub fn status(&self) -> BrokerStatus {
        self.status.snapshot()
    }

    /// Status as of `now`
    pub fn status_at(&self, now: Instant) -> BrokerStatus {
        self.status.snapshot_at(now)
    }

    /// Summaries of every topic, sorted by name
    pub fn topics(&self) -> Vec<TopicInfo> {
        let mut topics: Vec<TopicInfo> = self.registry.topics().iter().map(|t| t.info()).collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    /// Up to `limit` retained messages after `since`
    pub fn messages_since(&self, topic: &str, since: u64, limit: usize) -> BrokerResult<Vec<Message>> {
        Ok(self.registry.read_since(topic, since)?.take(limit).collect())
    }

    /// Remove a topic without subscribers
    pub fn remove_topic(&self, topic: &str) -> BrokerResult<()> {
        self.registry.remove_topic(topic)
    }

    /// Point-in-time views of every subscriber
    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        self.subscriptions.snapshot(Instant::now())
    }

    /// Current cursor of a subscriber
    pub fn cursor(&self, id: &SubscriberId) -> BrokerResult<u64> {
        self.subscriptions.cursor(id)
    }

    /// Current liveness of a subscriber
    pub fn liveness(&self, id: &SubscriberId) -> BrokerResult<Liveness> {
        self.subscriptions.liveness(id)
    }

    /// Head sequence of a topic
    pub fn head(&self, topic: &str) -> BrokerResult<u64> {
        self.registry.head(topic)
    }

    /// Number of running dispatch units
    pub fn dispatch_units(&self) -> usize {
        self.dispatcher.running_units()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

async fn run_sweeper(
    broker: Weak<Broker>,
    period: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(broker) = broker.upgrade() else {
            break;
        };
        broker.sweep(Instant::now());
    }
}
