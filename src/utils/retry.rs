//! Retry utilities with exponential backoff and jitter for upstream calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Classification of errors that may succeed on a later attempt
pub trait Transient {
    /// Whether retrying may help
    fn is_transient(&self) -> bool;

    /// Minimum delay requested by the remote side (e.g. `Retry-After`)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Relative jitter in `[0, 1]`: each delay is scaled by a random factor in `1 ± jitter`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::default().max_attempts(1)
    }

    /// Backoff before retry number `attempt` (1-based), jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let factor = if self.jitter > 0.0 {
            let jitter = self.jitter.min(1.0);
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0)).min(self.max_delay)
    }
}

/// Execute an async operation, retrying transient failures.
///
/// Permanent errors are returned immediately; transient ones are retried
/// until `max_attempts` is reached, sleeping the backoff delay (or the
/// error's `retry_after`, whichever is longer, capped at `max_delay`).
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after {} transient failures", attempt - 1);
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy
                    .delay_for(attempt)
                    .max(error.retry_after().unwrap_or_default())
                    .min(policy.max_delay);

                tracing::debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    "Transient error: {}, retrying",
                    error
                );
                sleep(delay).await;
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(attempts = attempt, "Operation failed after retries: {}", error);
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceError;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(&RetryPolicy::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(&fast_policy(4), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count < 3 {
                        // Fail on attempts 1 and 2
                        Err(SourceError::Server {
                            status: 503,
                            message: "temporarily unavailable".to_string(),
                        })
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(&fast_policy(3), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Timeout)
                }
            })
        }
        .await;

        assert_eq!(result.unwrap_err(), SourceError::Timeout);
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(&fast_policy(5), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::NotFound("not found".to_string()))
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(*call_count.borrow(), 1); // Should not retry on permanent error
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_honors_retry_after_up_to_max_delay() {
        let start = tokio::time::Instant::now();
        let call_count = Rc::new(RefCell::new(0));

        let _ = {
            let call_count = call_count.clone();
            with_retry(&fast_policy(2), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err::<(), _>(SourceError::RateLimit {
                        retry_after: Some(Duration::from_secs(30)),
                    })
                }
            })
        }
        .await;

        // retry_after is longer than max_delay, so the wait is capped
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(100) && waited < Duration::from_secs(1));
        assert_eq!(*call_count.borrow(), 2);
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = fast_policy(10);
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(8), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = fast_policy(3).jitter(0.5);
        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(30));
        }
    }
}
