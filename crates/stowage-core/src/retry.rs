//! Caller-side retry with exponential backoff
//!
//! Low-level components never retry on their own. Callers that want
//! retries wrap an operation with [`retry_with_policy`] (or a
//! [`RetryExecutor`] when they need a custom observer); only errors for
//! which [`Error::is_retryable`] holds are attempted again.

use crate::error::{Error, Result};
use crate::types::RetryPolicy;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Delay before the attempt following `attempt` (1-indexed).
///
/// `initial_delay_ms * backoff_multiplier^(attempt-1)`, capped at
/// `max_delay_ms`. Jitter adds up to 25% on top.
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);
    let multiplier = policy.backoff_multiplier.max(1.0).powf(attempt_index as f64);
    let base_delay_ms = (policy.initial_delay_ms as f64 * multiplier) as u64;
    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let jitter_range = capped_delay_ms / 4;
        capped_delay_ms + rand::rng().random_range(0..=jitter_range)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Callbacks fired by [`RetryExecutor`]
pub trait RetryObserver: Send + Sync {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32);

    fn on_attempt_failed(&self, attempt: u32, error: &Error, delay: Duration);

    fn on_success(&self, attempt: u32, total_duration: Duration);

    fn on_exhausted(&self, attempts: u32, final_error: &Error);

    /// The error was not retryable
    fn on_cancelled(&self, attempt: u32, error: &Error) {
        let _ = (attempt, error);
    }
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}
    fn on_attempt_failed(&self, _attempt: u32, _error: &Error, _delay: Duration) {}
    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}
    fn on_exhausted(&self, _attempts: u32, _final_error: &Error) {}
}

/// Observer that logs through `tracing`, labelled with the operation name
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        debug!("{}: attempt {}/{}", self.operation, attempt, max_attempts);
    }

    fn on_attempt_failed(&self, attempt: u32, error: &Error, delay: Duration) {
        warn!(
            "{}: attempt {} failed, retrying in {:?}: {}",
            self.operation, attempt, delay, error
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            info!(
                "{}: succeeded on attempt {} after {:?}",
                self.operation, attempt, total_duration
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &Error) {
        error!(
            "{}: giving up after {} attempts: {}",
            self.operation, attempts, final_error
        );
    }

    fn on_cancelled(&self, attempt: u32, error: &Error) {
        debug!(
            "{}: attempt {} failed with a non-retryable error: {}",
            self.operation, attempt, error
        );
    }
}

/// Retry loop bound to a policy and an observer
pub struct RetryExecutor<O = NoOpObserver> {
    policy: RetryPolicy,
    observer: O,
    jitter: bool,
}

impl RetryExecutor<NoOpObserver> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            observer: NoOpObserver,
            jitter: true,
        }
    }
}

impl<O: RetryObserver> RetryExecutor<O> {
    pub fn with_observer<O2: RetryObserver>(self, observer: O2) -> RetryExecutor<O2> {
        RetryExecutor {
            policy: self.policy,
            observer,
            jitter: self.jitter,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// policy's attempts are used up. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.observer.on_attempt_start(attempt, max_attempts);

            match op().await {
                Ok(value) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    self.observer.on_cancelled(attempt, &err);
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    self.observer.on_exhausted(attempt, &err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = calculate_delay(&self.policy, attempt, self.jitter);
                    self.observer.on_attempt_failed(attempt, &err, delay);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `op` under `policy`, logging retries under `operation`
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryExecutor::new(policy.clone())
        .with_observer(TracingObserver::new(operation))
        .execute(op)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_multiplier: 2.0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_multiplier: 2.0,
            initial_delay_ms: 100,
            max_delay_ms: 300,
        };
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_millis(100));
        assert_eq!(calculate_delay(&policy, 2, false), Duration::from_millis(200));
        assert_eq!(calculate_delay(&policy, 3, false), Duration::from_millis(300));
        assert_eq!(calculate_delay(&policy, 9, false), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_multiplier: 1.0,
            initial_delay_ms: 400,
            max_delay_ms: 400,
        };
        for _ in 0..50 {
            let delay = calculate_delay(&policy, 1, true).as_millis();
            assert!((400..=500).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_retries_transport_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_with_policy(&fast_policy(3), "put", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::transport("put", "k", "reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry_with_policy(&fast_policy(2), "put", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::transport("put", "k", "503"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry_with_policy(&fast_policy(5), "get", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::not_found("k"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let result = RetryExecutor::new(fast_policy(0))
            .execute(|| async { Ok::<_, Error>("done") })
            .await;
        assert_eq!(result.unwrap(), "done");
    }
}
