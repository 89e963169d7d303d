//! HTTP listener settings: bind address, CORS origins and the request body
//! limit applied ahead of JSON extraction.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};

/// Largest request body accepted by default (1 MiB)
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// `http` section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the original web front (5002)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed browser origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Request bodies larger than this are refused with 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5002
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl HttpServerConfig {
    /// `host:port` as written in the config
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        self.socket_addr()
            .parse()
            .map_err(|e| format!("invalid bind address '{}': {}", self.socket_addr(), e))
    }

    /// CORS origins as header values
    pub fn allowed_origins(&self) -> Result<Vec<HeaderValue>, String> {
        self.cors_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| format!("invalid CORS origin '{}'", origin))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.bind_addr()?;
        self.allowed_origins()?;
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be > 0".to_string());
        }
        Ok(())
    }
}
