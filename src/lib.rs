//! aeromq - An in-memory publish/subscribe message broker
//!
//! - [`broker`]: topics, subscriptions, delivery and status
//! - [`http_server`]: the HTTP surface
//! - [`observability`]: logging, events and counters
//! - [`cli`]: command-line entry points

pub mod broker;
pub mod cli;
pub mod http_server;
pub mod observability;
