//! # Broker Core
//!
//! In-memory publish/subscribe broker.
//!
//! # Components
//!
//! - [`TopicRegistry`]: topics and their append-only message logs
//! - [`SubscriptionManager`]: subscriber records, cursors and liveness
//! - [`PublishPipeline`]: validation, append and fan-out
//! - [`DeliveryDispatcher`]: one delivery task per subscriber
//! - [`StatusReporter`]: read-only status snapshots
//! - [`Broker`]: owns all of the above plus the liveness sweeper
//!
//! # Delivery
//!
//! At-least-once and cursor based. A subscriber's cursor is the last
//! sequence written to its transport; a resumed subscriber continues after
//! it. Ordering is guaranteed within a topic only.

mod backoff;
mod config;
mod dispatcher;
mod engine;
mod errors;
mod message;
mod publish;
mod status;
mod subscription;
mod topic;
mod transport;

pub use backoff::{BackoffPolicy, JitterPolicy};
pub use config::{BrokerConfig, DeliveryConfig};
pub use dispatcher::{DeliveryDispatcher, DispatchSettings};
pub use engine::Broker;
pub use errors::{BrokerError, BrokerResult};
pub use message::{Message, WireMessage};
pub use publish::{PublishPipeline, PublishResult};
pub use status::{BrokerStatus, Health, StatusReporter, TopicStatus};
pub use subscription::{
    Liveness, LivenessWindows, Subscriber, SubscriberId, SubscriberInfo, SubscriptionManager,
    SweepReport,
};
pub use topic::{Topic, TopicInfo, TopicReader, TopicRegistry};
pub use transport::{PollBuffer, PushReceiver, Transport, TransportKind};
