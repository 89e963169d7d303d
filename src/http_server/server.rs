//! # HTTP Server
//!
//! Main HTTP server combining all endpoint routers.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::broker_routes::{broker_routes, BrokerState};
use super::config::HttpServerConfig;
use super::observability_routes::observability_routes;
use crate::observability::Event;

/// HTTP Server for the broker
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with default configuration
    pub fn new(broker: BrokerState) -> Self {
        Self::with_config(broker, HttpServerConfig::default())
    }

    /// Create a new HTTP server with custom configuration
    pub fn with_config(broker: BrokerState, config: HttpServerConfig) -> Self {
        let router = Self::build_router(broker, &config);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(broker: BrokerState, config: &HttpServerConfig) -> Router {
        let origin = if config.cors_origins.is_empty() {
            AllowOrigin::any()
        } else {
            // Invalid origins are rejected by validate(); skip any that slip through
            let origins = config.allowed_origins().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring invalid CORS origins");
                Vec::new()
            });
            AllowOrigin::list(origins)
        };
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(observability_routes(broker.clone()))
            .merge(broker_routes(broker))
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .bind_addr()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(event = %Event::Serving, %addr, "http server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
