//! Bounded retry with exponential backoff for remote metric calls.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Retry settings as they appear in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            multiplier: 2.0,
            max_backoff_ms: 8000,
            jitter: false,
        }
    }
}

/// Outcome of a retried operation together with how many retries it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, FetchError>,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
    jitter: bool,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            multiplier: if cfg.multiplier < 1.0 { 1.0 } else { cfg.multiplier },
            max_backoff: Duration::from_millis(cfg.max_backoff_ms.max(cfg.initial_backoff_ms)),
            jitter: cfg.jitter,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31) as i32;
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let base = self.backoff_for(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        // Equal jitter: uniform in [base/2, base]
        let half = base.as_millis() as u64 / 2;
        let extra = rand::thread_rng().gen_range(0..=half);
        Duration::from_millis(half + extra)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        retries,
                    }
                }
                Err(e) if e.is_retryable() && retries + 1 < self.max_attempts => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    debug!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what,
                        e,
                        retries,
                        self.max_attempts - 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Retried {
                        result: Err(e),
                        retries,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from(&RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            multiplier: 2.0,
            max_backoff_ms: 4,
            jitter: false,
        })
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(8000));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out = fast_policy(3)
            .run("cpu", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Status(503))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(out.result.unwrap(), 42);
        assert_eq!(out.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out: Retried<()> = fast_policy(3)
            .run("cpu", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Status(404))
            })
            .await;

        assert!(matches!(out.result, Err(FetchError::Status(404))));
        assert_eq!(out.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_respected() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out: Retried<()> = fast_policy(3)
            .run("ram", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Timeout)
            })
            .await;

        assert!(out.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.retries, 2);
    }
}
