//! Bounded exponential-backoff retry around remote fetches.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient fetch failures. The default never retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after the first one. `0` disables retry.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    /// Non-transient errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = Backoff::new(self);
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff calculator with up to 25% jitter.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            next: policy.initial_backoff.min(policy.max_backoff),
            max: policy.max_backoff,
            multiplier: policy.multiplier.max(1.0),
        }
    }

    /// Next delay; grows by `multiplier` each call, capped at the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = base.mul_f64(self.multiplier).min(self.max);

        let base_ms = base.as_millis() as u64;
        let jitter = rand::random::<u64>() % (base_ms / 4 + 1);
        base + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_increases_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        let mut backoff = Backoff::new(&policy);

        let d1 = backoff.next_delay();
        let d2 = backoff.next_delay();
        let d3 = backoff.next_delay();
        assert!(d1.as_millis() >= 100 && d1.as_millis() <= 125);
        assert!(d2.as_millis() >= 200);
        assert!(d3.as_millis() >= 400);

        for _ in 0..20 {
            assert!(backoff.next_delay().as_millis() <= 625);
        }
    }

    #[tokio::test]
    async fn test_default_policy_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::remote(0, "503", true))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CacheError::remote(0, "timeout", true))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(2)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::remote(0, "timeout", true))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(5)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CacheError::remote(0, "401 unauthorized", false))
            })
            .await;
        assert!(matches!(result, Err(CacheError::RemoteFetch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
