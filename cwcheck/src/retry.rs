//! Bounded retry for backend calls
//!
//! Transient backend errors are retried with exponential backoff: the delay
//! for attempt `n` is `initial_backoff * 2^n` capped at `max_backoff`, plus up
//! to 50% random jitter. Non-transient errors are returned immediately.

use std::{future::Future, time::Duration};

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend;

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_millis() -> u64 {
    200
}

fn default_max_backoff_millis() -> u64 {
    5_000
}

/// Retry policy for backend calls
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Retries after the first attempt. Zero disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_millis")]
    pub initial_backoff_millis: u64,
    /// Upper bound on the delay before jitter
    #[serde(default = "default_max_backoff_millis")]
    pub max_backoff_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_millis: default_initial_backoff_millis(),
            max_backoff_millis: default_max_backoff_millis(),
        }
    }
}

/// Backoff before retry number `attempt`, without jitter
fn base_backoff(config: &Config, attempt: u32) -> Duration {
    let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let millis = config
        .initial_backoff_millis
        .saturating_mul(factor)
        .min(config.max_backoff_millis);
    Duration::from_millis(millis)
}

fn backoff(config: &Config, attempt: u32) -> Duration {
    let base = base_backoff(config, attempt);
    let half = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    base + Duration::from_millis(jitter)
}

/// Run `operation`, retrying transient failures according to `config`
///
/// Returns the first success, the first non-transient error, or the last
/// transient error once retries are exhausted.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &Config,
    operation_name: &str,
    mut operation: F,
) -> Result<T, backend::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, backend::Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = backoff(config, attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient error, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
