use std::future::Future;
use std::time::Duration;

use crate::error::{Result, ShalaError};

/// Bounds for re-running an operation that failed with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 2,
            max_delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff after the given (zero-based) failed attempt.
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(32) as u32);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Failure of [`with_retry`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-transient error; returned as soon as it occurred.
    Permanent(E),
    /// The last transient error after `attempts` tries.
    Exhausted { last: E, attempts: usize },
}

/// Retry an async operation with exponential backoff for transient errors.
/// Non-transient errors are returned immediately.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    f: F,
) -> std::result::Result<T, RetryError<ShalaError>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        last: e,
                        attempts: attempt,
                    });
                }
                let delay = policy.delay(attempt - 1);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn fast(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(&fast(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ShalaError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_transient_error_no_retry() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(&fast(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ShalaError::ClassFull(Uuid::nil())) }
        })
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Permanent(ShalaError::ClassFull(_)))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_error_stops_at_max_attempts() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(&fast(4), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ShalaError::Conflict(Uuid::nil())) }
        })
        .await;
        match result {
            Err(RetryError::Exhausted { last, attempts: n }) => {
                assert!(matches!(last, ShalaError::Conflict(_)));
                assert_eq!(n, 4);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transient_error_succeeds_on_retry() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(&fast(5), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err::<i32, _>(ShalaError::Conflict(Uuid::nil()))
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(&fast(0), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ShalaError>(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 2,
            max_delay_ms: 50,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(2));
        assert_eq!(policy.delay(3), Duration::from_millis(16));
        assert_eq!(policy.delay(9), Duration::from_millis(50));
        assert_eq!(policy.delay(200), Duration::from_millis(50));
    }
}
