//! Retrying store calls.
//!
//! Store failures are treated as transient, but never indefinitely: each call
//! gets a bounded number of attempts with capped exponential backoff, and the
//! whole sequence is cut off at the caller's deadline.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("{operation}: giving up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: StoreError,
    },
    #[error("{operation}: deadline exceeded after {attempts} attempts")]
    DeadlineExceeded {
        operation: String,
        attempts: u32,
        last: Option<StoreError>,
    },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 0 = no attempt cap; only the deadline stops the loop.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based): `initial * 2^(attempt-1)`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        delay.mul_f64(rand::rng().random_range(0.5..=1.0))
    }

    /// Run `call` until it succeeds, the attempts run out, or `deadline`
    /// passes. An attempt still in flight at the deadline is abandoned.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Instant,
        mut call: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        let mut last = None;

        loop {
            attempt += 1;
            let err = match tokio::time::timeout_at(deadline, call()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        tracing::info!("{operation} recovered on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    return Err(RetryError::DeadlineExceeded {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last,
                    });
                }
            };

            tracing::warn!("store error in {operation} (attempt {attempt}): {err}");

            if self.max_attempts != 0 && attempt >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.jittered(self.backoff(attempt));
            if Instant::now() + delay >= deadline {
                return Err(RetryError::DeadlineExceeded {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Some(err),
                });
            }
            last = Some(err);
            tokio::time::sleep(delay).await;
        }
    }
}
