//! Timeout and bounded-retry policy for model calls.

use std::future::Future;
use std::time::Duration;

/// Failure classification shared by embedding and generation errors.
pub trait ModelCallError: std::error::Error {
    /// Whether another attempt may succeed (timeouts, unavailable runtime, 429/5xx).
    fn is_transient(&self) -> bool;

    /// Error reported when an attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Timeout and retry budget applied to a class of model calls.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry; doubled for every later one.
    pub base_backoff: Duration,
}

const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Upper bound on a single reachability check.
pub(crate) const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

impl CallPolicy {
    /// Policy with the default 500 ms base backoff.
    pub fn new(timeout: Duration, max_attempts: usize) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(500),
        }
    }

    /// Override the base backoff.
    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(MAX_BACKOFF_EXPONENT);
        self.base_backoff * (1u32 << exponent)
    }
}

/// Run `call` under `policy`, retrying transient failures with exponential backoff.
pub(crate) async fn call_with_policy<T, E, F, Fut>(
    policy: &CallPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, E>
where
    E: ModelCallError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1usize;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Model call failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                tracing::error!(operation, attempt, error = %error, "Model call failed");
                return Err(error);
            }
        }
    }
}
