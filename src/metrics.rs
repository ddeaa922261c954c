//! Prometheus metrics describing the poller itself.
//!
//! Remote host readings are not re-exported here; these series only describe
//! how polling is going (outcomes, failures, retries, cycle timing).

use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

/// Poll outcome label values.
pub const OUTCOME_HEALTHY: &str = "healthy";
pub const OUTCOME_DEGRADED: &str = "degraded";
pub const OUTCOME_UNREACHABLE: &str = "unreachable";
pub const OUTCOME_DISCARDED: &str = "discarded";

#[derive(Clone)]
pub struct PollerMetrics {
    pub polls_total: CounterVec,           // labels: outcome
    pub family_failures_total: CounterVec, // labels: family
    pub retries_total: Counter,
    pub cycle_duration_seconds: Histogram,
    pub hosts_registered: Gauge,
    pub hosts_healthy: Gauge,
    pub registry_resets_total: Counter,
}

impl PollerMetrics {
    /// Creates and registers all poller metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let polls_total = CounterVec::new(
            Opts::new(
                "herakles_fleet_polls_total",
                "Host polls by outcome (healthy, degraded, unreachable, discarded)",
            ),
            &["outcome"],
        )?;
        let family_failures_total = CounterVec::new(
            Opts::new(
                "herakles_fleet_family_failures_total",
                "Metric family fetches that fell back to defaults",
            ),
            &["family"],
        )?;
        let retries_total = Counter::new(
            "herakles_fleet_retries_total",
            "Retried metric calls after a retryable failure",
        )?;
        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "herakles_fleet_cycle_duration_seconds",
                "Wall time of one poll cycle",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let hosts_registered = Gauge::new(
            "herakles_fleet_hosts_registered",
            "Hosts currently in the roster",
        )?;
        let hosts_healthy = Gauge::new(
            "herakles_fleet_hosts_healthy",
            "Hosts healthy in the last poll cycle",
        )?;
        let registry_resets_total = Counter::new(
            "herakles_fleet_registry_resets_total",
            "Corrupt rosters replaced by an empty one",
        )?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(family_failures_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(hosts_registered.clone()))?;
        registry.register(Box::new(hosts_healthy.clone()))?;
        registry.register(Box::new(registry_resets_total.clone()))?;

        Ok(Self {
            polls_total,
            family_failures_total,
            retries_total,
            cycle_duration_seconds,
            hosts_registered,
            hosts_healthy,
            registry_resets_total,
        })
    }

    /// Metrics bound to a private registry, for tools and tests that never
    /// expose them.
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::new(&Registry::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_all_series_registered() {
        let registry = Registry::new();
        let metrics = PollerMetrics::new(&registry).unwrap();
        metrics.polls_total.with_label_values(&[OUTCOME_HEALTHY]).inc();
        metrics.family_failures_total.with_label_values(&["cpu"]).inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("herakles_fleet_polls_total{outcome=\"healthy\"} 1"));
        assert!(text.contains("herakles_fleet_family_failures_total{family=\"cpu\"} 1"));
        assert!(text.contains("herakles_fleet_cycle_duration_seconds"));
        assert!(text.contains("herakles_fleet_registry_resets_total 0"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        PollerMetrics::new(&registry).unwrap();
        assert!(PollerMetrics::new(&registry).is_err());
    }
}
