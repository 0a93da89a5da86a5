//! Bounded retry with jittered exponential backoff for object storage calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use teadiary_core::S3Settings;
use tokio::time::Instant;

use crate::traits::{StorageError, StorageResult};

/// Retry budget for one logical storage call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Overall deadline for all attempts and the sleeps between them.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &S3Settings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            timeout: settings.timeout,
            ..Self::default()
        }
    }

    /// Upper bound of the delay before retry number `retry` (0-based):
    /// `base * 2^retry`, capped at `max_delay`.
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Jittered delay in `[ceiling / 2, ceiling]`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry);
        ceiling.mul_f64(rand::rng().random_range(0.5..=1.0))
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, runs
/// out of attempts, or the policy deadline passes.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut tries = 0u32;

    loop {
        tries += 1;

        let outcome = match tokio::time::timeout_at(deadline, attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    operation,
                    attempts = tries,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "Object storage call exceeded its time budget"
                );
                return Err(StorageError::Transient(format!(
                    "{} timed out after {} attempt(s)",
                    operation, tries
                )));
            }
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && tries < policy.max_attempts => {
                let delay = policy.delay_for(tries - 1);
                if Instant::now() + delay >= deadline {
                    return Err(err);
                }
                tracing::warn!(
                    operation,
                    attempt = tries,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error_kind = err.kind(),
                    "Retrying object storage call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ceiling(0), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(400));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(800));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_secs(2));
        assert_eq!(policy.backoff_ceiling(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(3), "put", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StorageError::Transient("503".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = with_backoff(&fast_policy(3), "put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Transient("connection reset".into()))
        })
        .await;

        assert!(matches!(result, Err(StorageError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = with_backoff(&fast_policy(3), "put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Rejected("403 Forbidden".into()))
        })
        .await;

        assert!(matches!(result, Err(StorageError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overall_timeout_bounds_slow_attempts() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(50),
            ..fast_policy(5)
        };
        let started = std::time::Instant::now();
        let result: StorageResult<()> = with_backoff(&policy, "put", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StorageError::Transient(ref m)) if m.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
