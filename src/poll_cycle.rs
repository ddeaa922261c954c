//! One round of polling the fleet.
//!
//! A cycle reads the roster, fetches every due host with bounded
//! concurrency, applies successful results to the registry and history, and
//! returns the snapshot set in roster order. Hosts that were not due keep
//! their previous snapshot, marked as not fresh, with its original
//! observation time.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::engine_config::EngineConfig;
use crate::fetcher::{Family, Fetcher, MetricsSnapshot};
use crate::history::HistoryStore;
use crate::host::{CpuInfo, Host, HostId};
use crate::metrics::{
    PollerMetrics, OUTCOME_DEGRADED, OUTCOME_DISCARDED, OUTCOME_HEALTHY, OUTCOME_UNREACHABLE,
};
use crate::poll_stats::{CycleOutcome, PollStats};
use crate::registry::Registry;

/// Latest known state of one host, as handed to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub id: HostId,
    pub nickname: String,
    pub hostname: String,
    /// `None` until the host has been polled once.
    pub snapshot: Option<MetricsSnapshot>,
    /// Whether `snapshot` was taken in the cycle that produced this set.
    pub fresh: bool,
    #[serde(skip)]
    pub generation: u64,
}

/// All hosts after one cycle, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotSet {
    pub taken_at: Option<DateTime<Utc>>,
    pub hosts: Vec<HostSnapshot>,
}

impl SnapshotSet {
    pub fn get(&self, id: &HostId) -> Option<&HostSnapshot> {
        self.hosts.iter().find(|h| &h.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn healthy(&self) -> usize {
        self.hosts
            .iter()
            .filter(|h| h.snapshot.as_ref().is_some_and(|s| s.health))
            .count()
    }
}

pub struct PollCycle {
    registry: Arc<Registry>,
    history: Arc<HistoryStore>,
    fetcher: Fetcher,
    metrics: PollerMetrics,
    stats: Arc<PollStats>,
    max_concurrent: usize,
    host_deadline: Duration,
}

impl PollCycle {
    pub fn new(
        registry: Arc<Registry>,
        history: Arc<HistoryStore>,
        fetcher: Fetcher,
        config: &EngineConfig,
        metrics: PollerMetrics,
        stats: Arc<PollStats>,
    ) -> Self {
        Self {
            registry,
            history,
            fetcher,
            metrics,
            stats,
            max_concurrent: config.poll.max_concurrent_fetches.max(1),
            host_deadline: config.fetch.host_deadline(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Polls every registered host.
    pub async fn run_all(&self) -> SnapshotSet {
        self.run(&SnapshotSet::default(), |_| true).await
    }

    /// Polls the hosts for which `is_due` holds and carries the rest over
    /// from `previous`.
    #[instrument(skip(self, previous, is_due))]
    pub async fn run<F>(&self, previous: &SnapshotSet, is_due: F) -> SnapshotSet
    where
        F: Fn(&Host) -> bool,
    {
        let start = Instant::now();
        self.sync_roster().await;
        let hosts = self.registry.list();
        self.metrics.hosts_registered.set(hosts.len() as f64);

        if hosts.is_empty() {
            debug!("No hosts registered, nothing to poll");
            self.metrics.hosts_healthy.set(0.0);
            return SnapshotSet {
                taken_at: Some(Utc::now()),
                hosts: Vec::new(),
            };
        }

        let due: Vec<Host> = hosts
            .iter()
            .map(|(_, host)| host)
            .filter(|host| is_due(host))
            .cloned()
            .collect();
        debug!("Polling {} of {} hosts", due.len(), hosts.len());

        let results = self.fetch_all(due).await;
        let (fresh, outcome) = self.apply(results);
        self.sync_roster().await;

        self.history
            .retain_hosts(self.registry.list().iter().map(|(id, _)| id));

        let set = self.assemble(previous, fresh);
        let elapsed = start.elapsed();

        self.metrics.hosts_healthy.set(set.healthy() as f64);
        self.metrics
            .cycle_duration_seconds
            .observe(elapsed.as_secs_f64());
        self.stats.record_cycle(&outcome, elapsed);

        info!(
            "Poll cycle done in {:.3}s: polled={} healthy={} degraded={} unreachable={} discarded={}",
            elapsed.as_secs_f64(),
            outcome.polled,
            outcome.healthy,
            outcome.degraded,
            outcome.unreachable,
            outcome.discarded
        );

        set
    }

    /// Fetches hosts concurrently. Each host is bounded by the host
    /// deadline, so one stuck host cannot hold up the cycle.
    async fn fetch_all(&self, hosts: Vec<Host>) -> Vec<(Host, MetricsSnapshot)> {
        let deadline = self.host_deadline;
        stream::iter(hosts)
            .map(move |host| async move {
                let snapshot =
                    match tokio::time::timeout(deadline, self.fetcher.fetch(&host)).await {
                        Ok(snapshot) => snapshot,
                        Err(_) => {
                            warn!("Host {} exceeded the {:?} fetch deadline", host.id, deadline);
                            MetricsSnapshot::unreachable(format!(
                                "no complete response within {}s",
                                deadline.as_secs()
                            ))
                        }
                    };
                (host, snapshot)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    /// Writes pending poll results and merges roster edits made by other
    /// processes. Runs on the blocking pool so file syncs never stall the
    /// runtime; failures are logged and the results stay pending.
    async fn sync_roster(&self) {
        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.sync_with_disk()).await {
            Ok(Ok(true)) => debug!("Roster written to {}", self.registry.path().display()),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => warn!("Failed to persist roster: {}", e),
            Err(e) => warn!("Roster sync task failed: {}", e),
        }
    }

    /// Applies results whose host is still registered under the same
    /// generation; everything else is discarded.
    fn apply(
        &self,
        results: Vec<(Host, MetricsSnapshot)>,
    ) -> (HashMap<HostId, (u64, MetricsSnapshot)>, CycleOutcome) {
        let mut outcome = CycleOutcome {
            polled: results.len(),
            ..CycleOutcome::default()
        };
        let mut fresh = HashMap::with_capacity(results.len());

        for (host, snapshot) in results {
            outcome.retries += snapshot.retries as u64;
            self.metrics.retries_total.inc_by(snapshot.retries as f64);

            let applied = match &snapshot.readings {
                Some(readings) if snapshot.health => {
                    let cpu_info = (!snapshot.failed(Family::Cpu) && readings.cpu.cores() > 0)
                        .then(|| CpuInfo {
                            cores: readings.cpu.cores(),
                        });
                    let ram_info = (!snapshot.failed(Family::RamInfo)).then(|| readings.ram.info());

                    let current = self.registry.record_poll(
                        &host.id,
                        host.generation,
                        snapshot.observed_at,
                        cpu_info,
                        ram_info,
                    );
                    if current {
                        self.history.append(
                            &host.id,
                            host.generation,
                            snapshot.observed_at,
                            readings.cpu.average,
                            &readings.cpu.per_core,
                            readings.ram.usage_percent,
                        );
                    }
                    current
                }
                _ => self.registry.is_current(&host.id, host.generation),
            };

            if !applied {
                debug!("Host {} was removed during the cycle, dropping its result", host.id);
                outcome.discarded += 1;
                self.metrics
                    .polls_total
                    .with_label_values(&[OUTCOME_DISCARDED])
                    .inc();
                continue;
            }

            let label = if !snapshot.health {
                outcome.unreachable += 1;
                OUTCOME_UNREACHABLE
            } else if snapshot.is_partial() {
                outcome.healthy += 1;
                outcome.degraded += 1;
                OUTCOME_DEGRADED
            } else {
                outcome.healthy += 1;
                OUTCOME_HEALTHY
            };
            self.metrics.polls_total.with_label_values(&[label]).inc();

            for failure in &snapshot.degraded {
                outcome.family_failures += 1;
                self.metrics
                    .family_failures_total
                    .with_label_values(&[failure.family.as_str()])
                    .inc();
            }

            fresh.insert(host.id.clone(), (host.generation, snapshot));
        }

        (fresh, outcome)
    }

    fn assemble(
        &self,
        previous: &SnapshotSet,
        mut fresh: HashMap<HostId, (u64, MetricsSnapshot)>,
    ) -> SnapshotSet {
        let hosts = self
            .registry
            .list()
            .into_iter()
            .map(|(id, host)| {
                let prior = previous
                    .get(&id)
                    .filter(|p| p.generation == host.generation);

                let (snapshot, is_fresh) = match fresh.remove(&id) {
                    Some((generation, snap)) if generation == host.generation => {
                        let was_healthy = prior
                            .and_then(|p| p.snapshot.as_ref())
                            .map(|s| s.health);
                        if was_healthy.is_some_and(|h| h != snap.health) {
                            if snap.health {
                                info!("Host {} is reachable again", id);
                            } else {
                                info!("Host {} became unreachable", id);
                            }
                        }
                        (Some(snap), true)
                    }
                    _ => (prior.and_then(|p| p.snapshot.clone()), false),
                };

                HostSnapshot {
                    id,
                    nickname: host.nickname,
                    hostname: host.hostname,
                    snapshot,
                    fresh: is_fresh,
                    generation: host.generation,
                }
            })
            .collect();

        SnapshotSet {
            taken_at: Some(Utc::now()),
            hosts,
        }
    }
}
