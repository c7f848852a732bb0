//! Retry policy for rate-limited operations
//!
//! A bounded retry with linear backoff: after failed attempt `n` the policy
//! waits `n * unit` before trying again. Only errors accepted by the retry
//! predicate are retried (by default: rate-limit responses). Whatever ends the
//! loop, a non-retryable error or the last attempt, is returned wrapped in
//! [`Error::TransientNetwork`] with the number of attempts made.
//!
//! The policy adds no side effects of its own. Operations that must not be
//! repeated blindly, such as the publish click, are never run through it.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of invocations, including the first
    pub max_attempts: u32,

    /// Backoff unit; the wait after attempt `n` is `n * unit`
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unit: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom attempts and backoff unit
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    /// Delay applied after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }

    /// Run `operation`, retrying rate-limit failures
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(operation, Error::is_rate_limited).await
    }

    /// Run `operation`, retrying only errors accepted by `should_retry`
    pub async fn run_if<T, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) if !should_retry(&e) => {
                    warn!(attempt, error = %e, "Non-retryable error encountered");
                    return Err(Error::TransientNetwork {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Retry attempts exhausted"
                    );
                    return Err(Error::TransientNetwork {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
