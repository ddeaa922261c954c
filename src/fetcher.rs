//! Per-host metric collection.
//!
//! A fetch is a health probe followed, if the host is reachable, by four
//! independent metric family calls issued concurrently. Each family is
//! retried on its own and falls back to a default on failure, so a broken
//! endpoint degrades one part of the snapshot instead of the whole host.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::aggregator::{self, CpuReading, LogSummary, Readings};
use crate::engine_config::FetchConfig;
use crate::error::FetchError;
use crate::host::{Host, RamInfo};
use crate::retry::{Retried, RetryPolicy};

pub const HEALTH_PATH: &str = "/health";

/// Independently fetched parts of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Cpu,
    RamInfo,
    RamUsage,
    Logs,
}

impl Family {
    pub const ALL: [Family; 4] = [Family::Cpu, Family::RamInfo, Family::RamUsage, Family::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Cpu => "cpu",
            Family::RamInfo => "ram_info",
            Family::RamUsage => "ram_usage",
            Family::Logs => "logs",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Family::Cpu => "/metrics/v1/cpu/usage",
            Family::RamInfo => "/metrics/v1/ram/info",
            Family::RamUsage => "/metrics/v1/ram/usage",
            Family::Logs => "/metrics/v1/logs/metrics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The host stopped answering after the probe succeeded.
    Unreachable,
    /// Timeout, transport error or non-2xx status after retries.
    MetricFamilyFailure,
    /// Response arrived but did not match the expected schema.
    MalformedPayload,
}

impl From<&FetchError> for FailureKind {
    fn from(e: &FetchError) -> Self {
        match e {
            FetchError::MalformedPayload { .. } => FailureKind::MalformedPayload,
            FetchError::Unreachable(_) => FailureKind::Unreachable,
            FetchError::Transport(t) if t.is_connect() => FailureKind::Unreachable,
            _ => FailureKind::MetricFamilyFailure,
        }
    }
}

/// One metric family that was replaced by its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyFailure {
    pub family: Family,
    pub kind: FailureKind,
    pub detail: String,
}

/// Result of fetching one host once.
///
/// `readings` is `None` exactly when the host was unreachable, so missing
/// data can never be read as genuine zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub health: bool,
    pub observed_at: DateTime<Utc>,
    pub readings: Option<Readings>,
    /// Families that fell back to defaults. Empty on a clean fetch.
    pub degraded: Vec<FamilyFailure>,
    /// Why the host was considered unreachable.
    pub error: Option<String>,
    /// Retries spent across all families.
    pub retries: u32,
}

impl MetricsSnapshot {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            health: false,
            observed_at: Utc::now(),
            readings: None,
            degraded: Vec::new(),
            error: Some(reason.into()),
            retries: 0,
        }
    }

    /// Healthy but at least one family defaulted.
    pub fn is_partial(&self) -> bool {
        self.health && !self.degraded.is_empty()
    }

    pub fn failed(&self, family: Family) -> bool {
        self.degraded.iter().any(|f| f.family == family)
    }
}

/// HTTP client for the remote metrics API.
#[derive(Clone)]
pub struct Fetcher {
    probe: Client,
    metrics: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let probe = Client::builder()
            .connect_timeout(config.health_timeout())
            .timeout(config.health_timeout())
            .build()?;
        let metrics = Client::builder()
            .connect_timeout(config.metrics_connect_timeout())
            .timeout(config.metrics_timeout())
            .build()?;

        Ok(Self {
            probe,
            metrics,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Probes `GET /health`. Only a 200 counts as reachable.
    pub async fn probe(&self, host: &Host) -> Result<(), FetchError> {
        let url = format!("{}{}", host.base_url(), HEALTH_PATH);
        let resp = self
            .probe
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        if resp.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(FetchError::Unreachable(format!(
                "health returned {}",
                resp.status().as_u16()
            )))
        }
    }

    /// Fetches one host. Never fails: every error is folded into the snapshot.
    #[instrument(skip(self, host), fields(host = %host.id))]
    pub async fn fetch(&self, host: &Host) -> MetricsSnapshot {
        if let Err(e) = self.probe(host).await {
            debug!("Host {} unreachable: {}", host.id, e);
            return MetricsSnapshot::unreachable(e.to_string());
        }

        let base = host.base_url();
        let (cpu, ram_info, ram_usage, logs) = tokio::join!(
            self.family(&base, Family::Cpu, |v| aggregator::decode_cpu(&v)),
            self.family(&base, Family::RamInfo, |v| aggregator::decode_ram_info(&v)),
            self.family(&base, Family::RamUsage, |v| aggregator::decode_ram_usage(&v)),
            self.family(&base, Family::Logs, aggregator::decode_logs),
        );

        let mut degraded = Vec::new();
        let mut retries = 0;
        let cpu: Option<CpuReading> = settle(host, Family::Cpu, cpu, &mut degraded, &mut retries);
        let ram_info: Option<RamInfo> =
            settle(host, Family::RamInfo, ram_info, &mut degraded, &mut retries);
        let ram_usage: Option<f64> =
            settle(host, Family::RamUsage, ram_usage, &mut degraded, &mut retries);
        let logs: Option<LogSummary> = settle(host, Family::Logs, logs, &mut degraded, &mut retries);

        MetricsSnapshot {
            health: true,
            observed_at: Utc::now(),
            readings: Some(Readings::assemble(cpu, ram_info, ram_usage, logs)),
            degraded,
            error: None,
            retries,
        }
    }

    async fn family<T, D>(&self, base: &str, family: Family, decode: D) -> Retried<T>
    where
        D: Fn(Value) -> Result<T, FetchError>,
    {
        let url = format!("{}{}", base, family.path());
        let url = url.as_str();
        let decode = &decode;
        self.retry
            .run(family.as_str(), || async move {
                let payload = self.get_json(url, family).await?;
                decode(payload)
            })
            .await
    }

    async fn get_json(&self, url: &str, family: Family) -> Result<Value, FetchError> {
        let resp = self.metrics.get(url).send().await.map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| FetchError::MalformedPayload {
            family: family.as_str(),
            reason: e.to_string(),
        })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e)
    }
}

fn settle<T>(
    host: &Host,
    family: Family,
    outcome: Retried<T>,
    degraded: &mut Vec<FamilyFailure>,
    retries: &mut u32,
) -> Option<T> {
    *retries += outcome.retries;
    match outcome.result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "Metric family {} failed for host {}: {}",
                family.as_str(),
                host.id,
                e
            );
            degraded.push(FamilyFailure {
                family,
                kind: FailureKind::from(&e),
                detail: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_paths() {
        assert_eq!(Family::Cpu.path(), "/metrics/v1/cpu/usage");
        assert_eq!(Family::Logs.path(), "/metrics/v1/logs/metrics");
        assert_eq!(Family::ALL.len(), 4);
    }

    #[test]
    fn test_failure_kind_mapping() {
        let malformed = FetchError::MalformedPayload {
            family: "cpu",
            reason: "x".into(),
        };
        assert_eq!(FailureKind::from(&malformed), FailureKind::MalformedPayload);
        assert_eq!(
            FailureKind::from(&FetchError::Status(503)),
            FailureKind::MetricFamilyFailure
        );
        assert_eq!(
            FailureKind::from(&FetchError::Unreachable("gone".into())),
            FailureKind::Unreachable
        );
    }

    #[test]
    fn test_unreachable_snapshot_has_no_readings() {
        let snap = MetricsSnapshot::unreachable("connection refused");
        assert!(!snap.health);
        assert!(snap.readings.is_none());
        assert!(!snap.is_partial());
        assert_eq!(snap.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_fetch_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let host = Host::new("127.0.0.1", port, "gone", "gone");
        let snap = fetcher.fetch(&host).await;

        assert!(!snap.health);
        assert!(snap.readings.is_none());
    }
}
