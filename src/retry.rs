use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff with jitter for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first failure.
    #[cfg(test)]
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `min(base * 2^retry, max) + random(0..base)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as u64);
        let jitter_ms = if base_ms > 0 {
            rand::thread_rng().gen_range(0..base_ms)
        } else {
            0
        };
        Duration::from_millis(capped_ms + jitter_ms)
    }
}

/// Run `operation` until it succeeds, `classify` says `Abort`, or the policy's
/// retries are used up. The last error is returned on failure.
///
/// `operation` receives the 0-indexed attempt number.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    classify: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation(attempt).await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        if attempt >= policy.max_retries || classify(&err) == RetryAction::Abort {
            return Err(err);
        }
        let delay = policy.delay_for_retry(attempt);
        tracing::warn!(
            attempt = attempt + 1,
            of = policy.max_retries + 1,
            delay_ms = delay.as_millis() as u64,
            "Retryable error: {}",
            err
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        };
        let d0 = policy.delay_for_retry(0);
        assert!(d0 >= Duration::from_millis(100) && d0 < Duration::from_millis(200));
        let d2 = policy.delay_for_retry(2);
        assert!(d2 >= Duration::from_millis(400) && d2 < Duration::from_millis(500));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_retries: 40,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };
        let d = policy.delay_for_retry(40);
        assert!(d >= Duration::from_secs(10) && d < Duration::from_secs(11));
    }

    #[test]
    fn test_never_has_no_delay() {
        assert_eq!(RetryPolicy::never().delay_for_retry(3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_first_success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            &fast(3),
            |_| RetryAction::Retry,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            &fast(3),
            |_| RetryAction::Abort,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("video removed".to_string()) }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "video removed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let result: Result<u32, String> = retry_with_backoff(
            &fast(3),
            |_| RetryAction::Retry,
            |attempt| async move {
                if attempt < 2 {
                    Err(format!("HTTP 503 on attempt {}", attempt))
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry_with_backoff(
            &fast(2),
            |_| RetryAction::Retry,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {}", attempt)) }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(4),
        };
        let start = tokio::time::Instant::now();
        let _: Result<(), String> =
            retry_with_backoff(&policy, |_| RetryAction::Retry, |_| async {
                Err("rate limited".to_string())
            })
            .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(8));
    }
}
