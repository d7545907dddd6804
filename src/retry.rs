use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::ServiceError;

/// Longest pause between two attempts
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded retry with exponential backoff for transport-class failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, multiplier: f64) -> Self {
        Self {
            max_retries,
            initial_backoff,
            multiplier,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            config.backoff_multiplier,
        )
    }

    /// Single attempt, used by stages whose failures are fatal
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-based), never above [`MAX_BACKOFF`]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Run `op` with a per-attempt timeout, retrying transient failures.
    ///
    /// A timed out attempt counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, label: &str, timeout: Duration, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retry = 0;
        loop {
            let attempt = retry + 1;
            debug!("{}: attempt {}/{}", label, attempt, self.max_retries + 1);

            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    let delay = self.backoff(retry);
                    warn!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        label, attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), 3.0)
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(3));
        assert_eq!(policy.max_retries(), 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(60, Duration::from_secs(1), 3.0);
        assert_eq!(policy.backoff(59), MAX_BACKOFF);
        assert_eq!(policy.backoff(u32::MAX), MAX_BACKOFF);

        let huge = RetryPolicy::new(2, Duration::from_secs(1), f64::MAX);
        assert_eq!(huge.backoff(1), MAX_BACKOFF);
        assert_eq!(huge.backoff(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_policy()
            .run("test", Duration::from_secs(5), move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ServiceError::Unavailable { status: 503, body: String::new() })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast_policy()
            .run("test", Duration::from_secs(5), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Transport("connection reset".into()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Transport(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = fast_policy()
            .run("test", Duration::from_secs(5), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Auth("bad key".into()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Auth(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast_policy()
            .run("test", Duration::from_millis(20), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
