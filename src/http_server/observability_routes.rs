//! Observability HTTP Routes
//!
//! Health check and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::broker_routes::BrokerState;
use crate::broker::Health;
use crate::observability::MetricsSnapshot;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub broker: Health,
}

/// Create observability routes
pub fn observability_routes(state: BrokerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check handler
///
/// The process is up whenever this answers; broker degradation is reported
/// in the body without failing the check.
async fn health_handler(State(broker): State<BrokerState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        broker: broker.status().health,
    };

    (StatusCode::OK, Json(response))
}

/// Metrics handler - returns counters as JSON
async fn metrics_handler(State(broker): State<BrokerState>) -> Json<MetricsSnapshot> {
    Json(broker.metrics().snapshot())
}
