//! # Delivery Dispatcher
//!
//! One dispatch unit (a tokio task) per live subscriber. A unit drains the
//! topic log from the subscriber's cursor, writes each message to the
//! transport, and advances the cursor after every successful write. It then
//! waits on the topic's wake-up channel, never holding the append lock.
//!
//! Failed writes are retried with bounded backoff. Past the retry ceiling
//! the subscriber is marked disconnected and the unit stops; the cursor is
//! preserved for a later resume.
//!
//! Ordering within a subscriber is strictly by sequence. Cancelling a unit
//! stops future deliveries but lets a write already in progress finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::backoff::BackoffPolicy;
use super::config::DeliveryConfig;
use super::errors::{BrokerError, BrokerResult};
use super::message::Message;
use super::subscription::{Liveness, SubscriberId, SubscriptionManager};
use super::topic::{Topic, TopicRegistry};
use super::transport::Transport;
use crate::observability::{Event, MetricsRegistry};

/// Retry and timeout policy for dispatch units
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub backoff: BackoffPolicy,
    /// Retries after the first failed write
    pub retry_ceiling: u32,
    pub write_timeout: Duration,
}

impl From<&DeliveryConfig> for DispatchSettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            backoff: config.backoff(),
            retry_ceiling: config.retry_ceiling,
            write_timeout: config.write_timeout(),
        }
    }
}

/// Handle to a running dispatch unit
#[derive(Debug)]
struct DispatchUnit {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DispatchUnit {
    fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Outcome of delivering one message
enum Delivery {
    Delivered,
    Cancelled,
    Failed(BrokerError),
}

/// Fans messages out to subscribers
#[derive(Debug)]
pub struct DeliveryDispatcher {
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    settings: DispatchSettings,
    metrics: Arc<MetricsRegistry>,
    units: Mutex<HashMap<SubscriberId, DispatchUnit>>,

    /// Runtime current at construction, used when callers have none
    runtime: Option<Handle>,
}

impl DeliveryDispatcher {
    /// Create a dispatcher with no running units
    ///
    /// Captures the current tokio runtime, if any, so units can be started
    /// from plain threads later.
    pub fn new(
        registry: Arc<TopicRegistry>,
        subscriptions: Arc<SubscriptionManager>,
        settings: DispatchSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            subscriptions,
            settings,
            metrics,
            units: Mutex::new(HashMap::new()),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Runtime to spawn tasks on: the caller's, else the captured one
    pub(crate) fn runtime(&self) -> BrokerResult<Handle> {
        Handle::try_current()
            .ok()
            .or_else(|| self.runtime.clone())
            .ok_or_else(|| BrokerError::Internal("no tokio runtime available".into()))
    }

    /// Start the dispatch unit for a subscriber, replacing any existing one
    ///
    /// Fails with `Internal` when neither the caller nor the dispatcher's
    /// creator had a tokio runtime.
    pub fn start(&self, id: SubscriberId) -> BrokerResult<()> {
        let runtime = self.runtime()?;
        let subscriber = self.subscriptions.get(&id)?;
        let head_rx = self.registry.watch(subscriber.topic())?;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let worker = Worker {
            id,
            registry: Arc::clone(&self.registry),
            subscriptions: Arc::clone(&self.subscriptions),
            settings: self.settings,
            metrics: Arc::clone(&self.metrics),
            head_rx,
            cancel_rx,
        };

        let mut units = self.units.lock().map_err(|_| BrokerError::poisoned())?;
        let handle = runtime.spawn(worker.run());
        if let Some(previous) = units.insert(
            id,
            DispatchUnit {
                cancel: cancel_tx,
                handle,
            },
        ) {
            previous.cancel();
        }

        tracing::debug!(event = %Event::DispatchStarted, subscriber = %id, "dispatch unit started");
        Ok(())
    }

    /// Stop a subscriber's dispatch unit
    ///
    /// Returns `false` if no unit was registered.
    pub fn stop(&self, id: &SubscriberId) -> bool {
        let unit = match self.units.lock() {
            Ok(mut units) => units.remove(id),
            Err(_) => return false,
        };
        match unit {
            Some(unit) => {
                unit.cancel();
                tracing::debug!(event = %Event::DispatchStopped, subscriber = %id, "dispatch unit stopped");
                true
            }
            None => false,
        }
    }

    /// Whether a subscriber has a unit that has not finished
    pub fn is_running(&self, id: &SubscriberId) -> bool {
        self.units
            .lock()
            .map(|units| units.get(id).is_some_and(|u| !u.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Number of units that have not finished
    pub fn running_units(&self) -> usize {
        self.units
            .lock()
            .map(|units| units.values().filter(|u| !u.handle.is_finished()).count())
            .unwrap_or(0)
    }

    /// Drop handles of units that have finished
    pub fn prune_finished(&self) -> usize {
        let Ok(mut units) = self.units.lock() else {
            return 0;
        };
        let before = units.len();
        units.retain(|_, unit| !unit.handle.is_finished());
        before - units.len()
    }

    /// Hand a freshly appended message's topic to its subscribers
    ///
    /// Units already waiting on the topic are woken by the append itself.
    /// Live subscribers without a running unit get one. Returns the number
    /// of subscribers the message was accepted for.
    pub fn fan_out(&self, topic: &Topic) -> usize {
        let mut accepted = 0;
        for id in topic.subscribers() {
            let Ok(subscriber) = self.subscriptions.get(&id) else {
                continue;
            };
            if subscriber.liveness() == Liveness::Disconnected {
                continue;
            }
            accepted += 1;
            if !self.is_running(&id) {
                if let Err(err) = self.start(id) {
                    tracing::warn!(subscriber = %id, error = %err, "failed to start dispatch unit");
                }
            }
        }
        accepted
    }

    /// Cancel every unit
    pub fn shutdown(&self) {
        if let Ok(mut units) = self.units.lock() {
            for (_, unit) in units.drain() {
                unit.cancel();
            }
        }
    }
}

/// State owned by one dispatch unit
struct Worker {
    id: SubscriberId,
    registry: Arc<TopicRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    settings: DispatchSettings,
    metrics: Arc<MetricsRegistry>,
    head_rx: watch::Receiver<u64>,
    cancel_rx: watch::Receiver<bool>,
}

impl Worker {
    fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow() || self.cancel_rx.has_changed().is_err()
    }

    async fn run(mut self) {
        loop {
            if self.cancelled() {
                break;
            }

            let Ok(subscriber) = self.subscriptions.get(&self.id) else {
                break;
            };
            if subscriber.liveness() == Liveness::Disconnected {
                break;
            }
            let Ok(transport) = subscriber.transport() else {
                break;
            };

            // Mark the current head seen before reading so an append racing
            // with the drain still wakes the wait below.
            self.head_rx.borrow_and_update();

            let reader = match self.registry.read_since(subscriber.topic(), subscriber.cursor()) {
                Ok(reader) => reader,
                Err(err) => {
                    tracing::warn!(subscriber = %self.id, error = %err, "topic unavailable");
                    break;
                }
            };

            for message in reader {
                if self.cancelled() {
                    return;
                }
                match self.deliver(&transport, &message).await {
                    Delivery::Delivered => {
                        self.metrics.increment_messages_delivered();
                        if let Err(err) = self.subscriptions.advance_cursor(&self.id, message.sequence) {
                            // Superseded by a newer unit or the subscriber is gone
                            tracing::debug!(subscriber = %self.id, error = %err, "cursor not advanced");
                            return;
                        }
                    }
                    Delivery::Cancelled => return,
                    Delivery::Failed(err) => {
                        let _ = self.subscriptions.mark_disconnected(&self.id, &err.to_string());
                        return;
                    }
                }
            }

            tokio::select! {
                changed = self.head_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.cancel_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Write one message, retrying transient failures with backoff
    async fn deliver(&mut self, transport: &Transport, message: &Message) -> Delivery {
        let mut attempt = 0;
        loop {
            match transport.write(message, self.settings.write_timeout).await {
                Ok(()) => return Delivery::Delivered,
                Err(err) if err.is_transient() && attempt < self.settings.retry_ceiling => {
                    let delay = self.settings.backoff.next(attempt);
                    attempt += 1;
                    self.metrics.increment_delivery_retries();
                    tracing::debug!(
                        event = %Event::DeliveryRetry,
                        subscriber = %self.id,
                        sequence = message.sequence,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying delivery"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel_rx.changed() => return Delivery::Cancelled,
                    }
                }
                Err(err) => {
                    self.metrics.increment_delivery_failures();
                    tracing::warn!(
                        event = %Event::DeliveryFailed,
                        subscriber = %self.id,
                        sequence = message.sequence,
                        attempts = attempt + 1,
                        error = %err,
                        "delivery failed"
                    );
                    return Delivery::Failed(err);
                }
            }
        }
    }
}
