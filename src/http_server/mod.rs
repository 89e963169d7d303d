//! # AeroMQ HTTP Server Module
//!
//! HTTP surface of the broker, served with Axum.
//!
//! # Endpoints
//!
//! - `POST /publish`, `POST /subscribe`, `GET /broker_status` - UI calls
//! - `/subscribers/*` - poll, heartbeat, resume, unsubscribe
//! - `/topics/*` - topic listing, replay, removal
//! - `/health`, `/metrics` - observability

pub mod broker_routes;
pub mod config;
pub mod observability_routes;
pub mod server;

pub use broker_routes::BrokerState;
pub use config::HttpServerConfig;
pub use server::HttpServer;
