//! Tuning knobs for the polling engine.
//!
//! These structures are embedded in the binary's configuration file under
//! the `fetch` and `history` keys. Every field has a default so partial
//! sections are accepted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryConfig;

/// Timeouts and retry settings for remote metric calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Connect + read timeout of the `/health` probe.
    pub health_timeout_secs: u64,
    /// Connect timeout of metric calls.
    pub metrics_connect_timeout_secs: u64,
    /// Total timeout of each metric call attempt.
    pub metrics_timeout_secs: u64,
    /// Hard upper bound on one host's whole fetch (probe + all families
    /// including retries). A host exceeding it is reported unreachable.
    pub host_deadline_secs: u64,
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            health_timeout_secs: 5,
            metrics_connect_timeout_secs: 5,
            metrics_timeout_secs: 10,
            host_deadline_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn metrics_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_connect_timeout_secs)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_timeout_secs)
    }

    pub fn host_deadline(&self) -> Duration {
        Duration::from_secs(self.host_deadline_secs)
    }

    /// Worst-case wall time of one family: every attempt times out and every
    /// backoff is slept in full.
    pub fn worst_case_family(&self) -> Duration {
        let policy = crate::retry::RetryPolicy::from(&self.retry);
        let attempts = policy.max_attempts();
        let sleeps: Duration = (1..attempts).map(|r| policy.backoff_for(r)).sum();
        self.metrics_timeout() * attempts + sleeps
    }
}

/// Capacity of per-host history buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// Scheduling of poll cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub refresh_interval: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(3),
            max_concurrent_fetches: 8,
        }
    }
}

/// Everything the engine needs besides the roster location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub history: HistoryConfig,
    pub poll: PollConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert!(config.health_timeout() < config.metrics_timeout());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_worst_case_family() {
        // 3 attempts * 10s + 1s + 2s backoff
        assert_eq!(
            FetchConfig::default().worst_case_family(),
            Duration::from_secs(33)
        );
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: FetchConfig = serde_yaml::from_str("metrics_timeout_secs: 20").unwrap();
        assert_eq!(config.metrics_timeout_secs, 20);
        assert_eq!(config.health_timeout_secs, 5);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_history_config_default() {
        assert_eq!(HistoryConfig::default().capacity, 50);
    }
}
