use crate::error::{PipelineError, Result};

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Per-attempt connect timeout.
    pub timeout_ms: u64,
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout_ms: 5000,
            backoff_strategy: BackoffStrategy::Exponential {
                initial_delay_ms: 500,
                max_delay_ms: 8000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed { delay_ms: u64 },
    Exponential { initial_delay_ms: u64, max_delay_ms: u64 },
    Linear { increment_ms: u64 },
}

impl BackoffStrategy {
    fn initial(&self) -> u64 {
        match self {
            BackoffStrategy::Fixed { delay_ms } => *delay_ms,
            BackoffStrategy::Exponential {
                initial_delay_ms, ..
            } => *initial_delay_ms,
            BackoffStrategy::Linear { increment_ms } => *increment_ms,
        }
    }

    fn next(&self, delay: u64) -> u64 {
        match self {
            BackoffStrategy::Fixed { .. } => delay,
            BackoffStrategy::Exponential { max_delay_ms, .. } => {
                delay.saturating_mul(2).min(*max_delay_ms)
            }
            BackoffStrategy::Linear { increment_ms } => delay.saturating_add(*increment_ms),
        }
    }
}

/// Runs `operation` until it succeeds or `max_attempts` is reached, sleeping between
/// attempts according to the backoff strategy. Each attempt is bounded by `timeout_ms`.
/// Exhaustion is reported as `PipelineError::Connection` for `system`.
pub async fn retry_with_backoff<F, Fut, T, E>(
    system: &str,
    retry_config: &RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let max_attempts = retry_config.max_attempts.max(1);
    let timeout = Duration::from_millis(retry_config.timeout_ms);
    let mut delay = retry_config.backoff_strategy.initial();
    let mut attempts = 0;

    loop {
        attempts += 1;

        let message = match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("timed out after {:?}", timeout),
        };

        if attempts >= max_attempts {
            return Err(PipelineError::Connection {
                system: system.to_string(),
                message,
                attempts,
            });
        }

        warn!(
            "{} attempt {}/{} failed: {}; retrying in {}ms",
            system, attempts, max_attempts, message, delay
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
        delay = retry_config.backoff_strategy.next(delay);
    }
}
