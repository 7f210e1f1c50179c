//! What happens to a delivery after processing

use std::time::Duration;

use crate::config::BrokerConfig;
use crate::features::products::TransformError;

/// Outcome applied to a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Stored; acknowledge
    Ack,
    /// Transient failure; republish as retry number `attempt` after `delay`, then acknowledge
    Retry { attempt: u32, delay: Duration },
    /// Permanent failure or retries exhausted; reject without requeue
    DeadLetter { reason: String },
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_backoff(),
            max_delay: config.retry_max_backoff(),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide the disposition of a message that has already been retried `retries` times
    pub fn disposition<T>(&self, result: &Result<T, TransformError>, retries: u32) -> Disposition {
        match result {
            Ok(_) => Disposition::Ack,
            Err(err) if err.is_transient() && retries < self.max_retries => {
                let attempt = retries + 1;
                Disposition::Retry {
                    attempt,
                    delay: self.backoff(attempt),
                }
            },
            Err(err) if err.is_transient() => Disposition::DeadLetter {
                reason: format!("gave up after {} retries: {}", retries, err),
            },
            Err(err) => Disposition::DeadLetter {
                reason: err.to_string(),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_CONSUMER_MAX_RETRIES,
            base_delay: Duration::from_millis(crate::config::DEFAULT_CONSUMER_RETRY_BACKOFF_MS),
            max_delay: Duration::from_millis(crate::config::DEFAULT_CONSUMER_RETRY_MAX_BACKOFF_MS),
        }
    }
}
