//! # Subscriber Transports
//!
//! How messages reach a consumer. A subscriber is bound to exactly one
//! transport at a time:
//!
//! - **Push**: a bounded tokio channel; the consumer owns the receiver.
//! - **Poll**: a bounded buffer the consumer drains on its own schedule
//!   (used by the HTTP surface).
//!
//! A write that cannot complete (channel full past the write timeout, buffer
//! full, consumer gone) is a [`BrokerError::TransportFailure`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use super::errors::{BrokerError, BrokerResult};
use super::message::Message;

/// Receiving end of a push transport
pub type PushReceiver = mpsc::Receiver<Message>;

/// Transport kind, for status output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Push,
    Poll,
}

/// Transport handle bound to a subscriber
#[derive(Debug, Clone)]
pub enum Transport {
    /// Bounded push channel
    Push(mpsc::Sender<Message>),
    /// Consumer-drained buffer
    Poll(PollBuffer),
}

impl Transport {
    /// Create a push transport and its receiver
    pub fn push(capacity: usize) -> (Self, PushReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Transport::Push(tx), rx)
    }

    /// Create a poll transport and the consumer's handle to its buffer
    pub fn poll(capacity: usize) -> (Self, PollBuffer) {
        let buffer = PollBuffer::new(capacity);
        (Transport::Poll(buffer.clone()), buffer)
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Push(_) => TransportKind::Push,
            Transport::Poll(_) => TransportKind::Poll,
        }
    }

    /// Whether the consumer side is gone
    pub fn is_closed(&self) -> bool {
        match self {
            Transport::Push(tx) => tx.is_closed(),
            Transport::Poll(buffer) => buffer.is_closed(),
        }
    }

    /// Write one message, waiting at most `timeout` for capacity
    pub async fn write(&self, message: &Message, timeout: Duration) -> BrokerResult<()> {
        match self {
            Transport::Push(tx) => match tokio::time::timeout(timeout, tx.send(message.clone())).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(BrokerError::TransportFailure("push channel closed".into())),
                Err(_) => Err(BrokerError::TransportFailure(format!(
                    "write timed out after {}ms",
                    timeout.as_millis()
                ))),
            },
            Transport::Poll(buffer) => buffer.offer(message.clone()),
        }
    }

    /// Close the transport from the broker side
    pub fn close(&self) {
        if let Transport::Poll(buffer) = self {
            buffer.close();
        }
    }
}

#[derive(Debug)]
struct PollInner {
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
    closed: AtomicBool,
}

/// Bounded buffer drained by a polling consumer
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct PollBuffer {
    inner: Arc<PollInner>,
}

impl PollBuffer {
    /// Create an empty buffer
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(PollInner {
                queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
                capacity,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueue a message, failing if the buffer is full or closed
    fn offer(&self, message: Message) -> BrokerResult<()> {
        if self.is_closed() {
            return Err(BrokerError::TransportFailure("poll buffer closed".into()));
        }
        let mut queue = self
            .inner
            .queue
            .lock()
            .map_err(|_| BrokerError::poisoned())?;
        if queue.len() >= self.inner.capacity {
            return Err(BrokerError::TransportFailure(format!(
                "poll buffer full ({} messages)",
                self.inner.capacity
            )));
        }
        queue.push_back(message);
        Ok(())
    }

    /// Take every buffered message, oldest first
    pub fn drain(&self) -> Vec<Message> {
        self.inner
            .queue
            .lock()
            .map(|mut queue| queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Take up to `max` buffered messages, oldest first
    pub fn drain_up_to(&self, max: usize) -> Vec<Message> {
        self.inner
            .queue
            .lock()
            .map(|mut queue| {
                let n = max.min(queue.len());
                queue.drain(..n).collect()
            })
            .unwrap_or_default()
    }

    /// Buffered message count
    pub fn len(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Mark the buffer closed; later writes fail
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
