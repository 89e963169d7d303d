//! Broker Configuration
//!
//! Limits, retention, liveness windows and delivery policy for the broker core.
//! Every field has a serde default so partial config files are accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::{BackoffPolicy, JitterPolicy};
use super::errors::{BrokerError, BrokerResult};

/// Broker core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Maximum payload size in bytes (default: 64KB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Maximum topic name length in bytes (default: 256)
    #[serde(default = "default_max_topic_name_len")]
    pub max_topic_name_len: usize,

    /// Create topics on first publish/subscribe (default: true)
    #[serde(default = "default_true")]
    pub auto_create_topics: bool,

    /// Messages retained per topic before the oldest are trimmed (default: 10000)
    #[serde(default = "default_max_messages_per_topic")]
    pub max_messages_per_topic: usize,

    /// Remove topics without subscribers after this many idle seconds (default: never)
    #[serde(default)]
    pub topic_retention_secs: Option<u64>,

    /// Seconds without activity before a subscriber turns idle (default: 30)
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,

    /// Seconds without activity before a subscriber is disconnected (default: 300)
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,

    /// Seconds a disconnected subscriber is kept for resumption (default: 60)
    #[serde(default = "default_disconnect_grace_secs")]
    pub disconnect_grace_secs: u64,

    /// Idle seconds after which a subscriber degrades broker health (default: 120)
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,

    /// Liveness sweep period in milliseconds (default: 1000)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Per-topic backlog above which health is degraded (default: 1000)
    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: u64,

    /// Capacity of push transport channels (default: 256)
    #[serde(default = "default_push_channel_capacity")]
    pub push_channel_capacity: usize,

    /// Capacity of poll transport buffers (default: 1024)
    #[serde(default = "default_poll_buffer_capacity")]
    pub poll_buffer_capacity: usize,

    /// Topic used by publish requests that name none (default: "default")
    #[serde(default = "default_topic")]
    pub default_topic: String,

    /// Delivery retry policy
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Delivery retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Retries after the first failed write before disconnecting (default: 5)
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// First retry delay in milliseconds (default: 50)
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Retry delay cap in milliseconds (default: 5000)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Multiplicative backoff growth (default: 2.0)
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Jitter applied to retry delays (default: none)
    #[serde(default)]
    pub jitter: JitterPolicy,

    /// Transport write timeout in milliseconds (default: 1000)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_max_payload_bytes() -> usize {
    65536
}
fn default_max_topic_name_len() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_max_messages_per_topic() -> usize {
    10_000
}
fn default_idle_after_secs() -> u64 {
    30
}
fn default_liveness_timeout_secs() -> u64 {
    300
}
fn default_disconnect_grace_secs() -> u64 {
    60
}
fn default_idle_grace_secs() -> u64 {
    120
}
fn default_sweep_interval_ms() -> u64 {
    1000
}
fn default_backlog_threshold() -> u64 {
    1000
}
fn default_push_channel_capacity() -> usize {
    256
}
fn default_poll_buffer_capacity() -> usize {
    1024
}
fn default_topic() -> String {
    "default".to_string()
}
fn default_retry_ceiling() -> u32 {
    5
}
fn default_backoff_initial_ms() -> u64 {
    50
}
fn default_backoff_max_ms() -> u64 {
    5000
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_write_timeout_ms() -> u64 {
    1000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            max_topic_name_len: default_max_topic_name_len(),
            auto_create_topics: true,
            max_messages_per_topic: default_max_messages_per_topic(),
            topic_retention_secs: None,
            idle_after_secs: default_idle_after_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            disconnect_grace_secs: default_disconnect_grace_secs(),
            idle_grace_secs: default_idle_grace_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            backlog_threshold: default_backlog_threshold(),
            push_channel_capacity: default_push_channel_capacity(),
            poll_buffer_capacity: default_poll_buffer_capacity(),
            default_topic: default_topic(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: JitterPolicy::None,
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn topic_retention(&self) -> Option<Duration> {
        self.topic_retention_secs.map(Duration::from_secs)
    }

    /// Validate limits and windows
    pub fn validate(&self) -> BrokerResult<()> {
        if self.max_payload_bytes == 0 {
            return Err(BrokerError::Config("max_payload_bytes must be > 0".into()));
        }
        if self.max_topic_name_len == 0 {
            return Err(BrokerError::Config("max_topic_name_len must be > 0".into()));
        }
        if self.max_messages_per_topic == 0 {
            return Err(BrokerError::Config(
                "max_messages_per_topic must be > 0".into(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(BrokerError::Config("sweep_interval_ms must be > 0".into()));
        }
        if self.push_channel_capacity == 0 || self.poll_buffer_capacity == 0 {
            return Err(BrokerError::Config(
                "transport capacities must be > 0".into(),
            ));
        }
        if self.liveness_timeout_secs < self.idle_after_secs {
            return Err(BrokerError::Config(format!(
                "liveness_timeout_secs ({}) must be >= idle_after_secs ({})",
                self.liveness_timeout_secs, self.idle_after_secs
            )));
        }
        if self.default_topic.trim().is_empty() {
            return Err(BrokerError::Config("default_topic must not be empty".into()));
        }
        self.delivery.validate()
    }
}

impl DeliveryConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Backoff policy derived from this config
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.backoff_initial_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(BrokerError::Config("backoff_factor must be >= 1.0".into()));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(BrokerError::Config(
                "backoff_max_ms must be >= backoff_initial_ms".into(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(BrokerError::Config("write_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BrokerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_payload_bytes, 65536);
        assert_eq!(config.default_topic, "default");
        assert!(config.auto_create_topics);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BrokerConfig =
            serde_json::from_str(r#"{"backlog_threshold": 5, "delivery": {"retry_ceiling": 1}}"#)
                .unwrap();
        assert_eq!(config.backlog_threshold, 5);
        assert_eq!(config.delivery.retry_ceiling, 1);
        assert_eq!(config.delivery.write_timeout_ms, 1000);
        assert_eq!(config.idle_after_secs, 30);
    }

    #[test]
    fn test_liveness_shorter_than_idle_rejected() {
        let config = BrokerConfig {
            idle_after_secs: 60,
            liveness_timeout_secs: 10,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BrokerError::Config(_))));
    }

    #[test]
    fn test_backoff_factor_below_one_rejected() {
        let delivery = DeliveryConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(delivery.validate().is_err());
    }
}
