//! Configuration file
//!
//! One JSON document with `http`, `broker` and `logging` sections. Every
//! field has a default, so `{}` is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::broker::BrokerConfig;
use crate::http_server::HttpServerConfig;
use crate::observability::LoggingConfig;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener and CORS
    #[serde(default)]
    pub http: HttpServerConfig,

    /// Broker limits, liveness and delivery policy
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Log level and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load configuration from file, using defaults if the file is absent
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON document
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> CliResult<()> {
        self.http.validate().map_err(CliError::config_error)?;
        self.broker
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))?;
        self.logging
            .validate()
            .map_err(|e| CliError::config_error(e.message().to_string()))?;
        Ok(())
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> CliResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.http.port, 5002);
        assert_eq!(config.broker.default_topic, "default");
        assert_eq!(config.broker.delivery.retry_ceiling, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"{"http":{"port":9000},"broker":{"backlog_threshold":5,"delivery":{"retry_ceiling":2}}}"#,
        )
        .unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.broker.backlog_threshold, 5);
        assert_eq!(config.broker.delivery.retry_ceiling, 2);
        assert_eq!(config.broker.max_payload_bytes, 65536);
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = Config::parse(r#"{"cluster":{}}"#).unwrap_err();
        assert_eq!(err.code_str(), "AERO_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::parse(r#"{"broker":{"max_payload_bytes":0}}"#).is_err());
        assert!(Config::parse(r#"{"logging":{"format":"xml"}}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"http":{{"port":7000}}}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.http.port, 7000);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(Config::load(&path).is_err());
        assert_eq!(Config::load_or_default(&path).unwrap().http.port, 5002);
    }

    #[test]
    fn test_pretty_json_round_trips() {
        let json = Config::default().to_json_pretty().unwrap();
        let parsed = Config::parse(&json).unwrap();
        assert_eq!(parsed.broker.max_messages_per_topic, 10_000);
    }
}
