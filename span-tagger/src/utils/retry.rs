//! Retry with exponential backoff
//!
//! Transient failures ([`Error::is_transient`]) are retried until the
//! attempt budget is spent; any other error fails immediately.

use span_common::config::HoldingsConfig;
use span_common::{Error, Result};
use std::time::{Duration, Instant};

/// Attempt budget and backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HoldingsConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HoldingsConfig) -> Self {
        Self {
            max_attempts: config.retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are exhausted.
///
/// Exhaustion is reported as [`Error::FetchExhausted`] naming `target` and
/// carrying the last error message.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    target: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, link = target, attempt, "Retrying");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        link = target,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        link = target,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(Error::FetchExhausted {
                        link: target.to_string(),
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }

                let delay = backoff.min(policy.max_backoff);
                tracing::warn!(
                    operation = operation_name,
                    link = target,
                    attempt,
                    backoff_ms = delay.as_millis(),
                    error = %err,
                    "Transient failure, will retry after backoff"
                );

                tokio::time::sleep(delay).await;

                backoff = backoff.saturating_mul(2).min(policy.max_backoff);
            }
        }
    }
}
