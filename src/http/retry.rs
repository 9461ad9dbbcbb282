//! Bounded retry with linear backoff.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// How many times to retry, and the base delay between attempts.
///
/// The wait before retry `n` (1-based) is `base_delay * n`, so the default
/// policy sleeps 1s, 2s, 3s between its four attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// A policy that performs exactly one attempt.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Number of retries after the first attempt.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_total_attempts(&self) -> u32 {
        self.attempts.saturating_add(1)
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the policy is exhausted. The last error is returned unchanged.
///
/// Dropping the returned future stops any further attempts.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let total = policy.max_total_attempts();
    let mut attempt = 1;

    loop {
        let err: ClientError = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() {
            debug!("{}: non-retryable error: {}", operation_name, err);
            return Err(err);
        }

        if attempt >= total {
            debug!(
                "{}: giving up after {} attempt(s): {}",
                operation_name, attempt, err
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
            operation_name,
            attempt,
            total,
            err,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
