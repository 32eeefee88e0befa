//! Bounded retry with exponential backoff for remote model calls.
//!
//! A call is attempted at most `max_retries + 1` times. Errors that
//! [`TransportError::is_retryable`] rejects are returned at once; anything
//! else is retried after `base_backoff_ms * 2^attempt`, capped at
//! `max_backoff_ms`. The model-service timeout sentinel is just another
//! retryable error here, so it can no longer loop forever.

use std::future::Future;
use std::time::Duration;

use dialogue::TransportError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let total = self.max_retries + 1;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(backend = label, attempt, "Backend recovered after retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(backend = label, attempt = attempt + 1, error = %e, "Non-retryable backend error");
                    return Err(e);
                }
                Err(e) if attempt + 1 >= total => {
                    warn!(backend = label, attempts = total, error = %e, "Retry budget exhausted");
                    return Err(TransportError::Exhausted {
                        attempts: total,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        backend = label,
                        attempt = attempt + 1,
                        of = total,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
