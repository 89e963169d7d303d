//! # Delivery Backoff
//!
//! Retry delays for failed transport writes.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`, with
//! jitter applied last. The base delay depends only on the attempt number,
//! so jitter never compounds across attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Jitter applied on top of the backoff delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Predictable delays
    #[default]
    None,
    /// Random delay in `[0, delay]`
    Full,
    /// `delay / 2 + random[0, delay / 2]`
    Equal,
}

impl JitterPolicy {
    /// Apply jitter to a delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => {
                if ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
            }
            JitterPolicy::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=half)
                };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub first: Duration,
    /// Delay cap
    pub max: Duration,
    /// Growth factor per attempt
    pub factor: f64,
    /// Jitter
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(50),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-indexed)
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        self.jitter.apply(base)
    }
}
