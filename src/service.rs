//! The fleet service: one explicitly constructed owner of the registry,
//! history and poller, shared by the periodic driver and the view layer.
//!
//! View-layer actions arrive as typed `Intent` values and go through
//! `dispatch`. Poll cycles are serialized by an async mutex, so a manual
//! poll and a timer tick never overlap.

use ahash::AHashSet;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine_config::EngineConfig;
use crate::error::ServiceError;
use crate::fetcher::Fetcher;
use crate::history::{HistoryStore, HistoryView};
use crate::host::{Host, HostId};
use crate::metrics::PollerMetrics;
use crate::poll_cycle::{HostSnapshot, PollCycle, SnapshotSet};
use crate::poll_stats::PollStats;
use crate::registry::{LoadOutcome, Registry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalScope {
    Global,
    Host(HostId),
}

/// A user action coming from the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    AddHost {
        address: String,
        port: u16,
        nickname: String,
        hostname: String,
    },
    RemoveHost {
        id: HostId,
    },
    SetRefreshInterval {
        scope: IntervalScope,
        seconds: u64,
    },
    UpdateHost {
        id: HostId,
        nickname: Option<String>,
        hostname: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IntentOutcome {
    HostAdded { id: HostId },
    HostRemoved { id: HostId, removed: bool },
    IntervalSet { scope: IntervalScope, seconds: u64 },
    HostUpdated { id: HostId },
}

pub struct FleetService {
    poller: PollCycle,
    latest: RwLock<SnapshotSet>,
    interval_tx: watch::Sender<Duration>,
    host_intervals: DashMap<HostId, Duration>,
    last_attempt: DashMap<HostId, Instant>,
    cycle_lock: Mutex<()>,
}

impl FleetService {
    pub fn new(poller: PollCycle, refresh_interval: Duration) -> Self {
        let (interval_tx, _) = watch::channel(refresh_interval.max(Duration::from_secs(1)));
        Self {
            poller,
            latest: RwLock::new(SnapshotSet::default()),
            interval_tx,
            host_intervals: DashMap::new(),
            last_attempt: DashMap::new(),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Opens the roster and wires up fetcher, history and poller.
    pub fn open(
        roster_path: impl Into<PathBuf>,
        config: &EngineConfig,
        metrics: PollerMetrics,
        stats: Arc<PollStats>,
    ) -> Result<(Self, LoadOutcome), ServiceError> {
        let (registry, outcome) = Registry::open(roster_path)?;
        if let LoadOutcome::ResetCorrupt { reason } = &outcome {
            warn!("Host roster was reset because it could not be read: {}", reason);
            metrics.registry_resets_total.inc();
        }

        let fetcher = Fetcher::new(&config.fetch)?;
        let history = Arc::new(HistoryStore::new(config.history.capacity));
        let poller = PollCycle::new(
            Arc::new(registry),
            history,
            fetcher,
            config,
            metrics,
            stats,
        );

        Ok((Self::new(poller, config.poll.refresh_interval), outcome))
    }

    pub fn registry(&self) -> &Registry {
        self.poller.registry()
    }

    pub fn history(&self) -> &HistoryStore {
        self.poller.history()
    }

    /// Snapshot set of the most recent cycle.
    pub fn snapshots(&self) -> SnapshotSet {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self, id: &HostId) -> Option<HostSnapshot> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn host(&self, id: &HostId) -> Result<Host, ServiceError> {
        self.registry()
            .get(id)
            .ok_or_else(|| ServiceError::UnknownHost(id.to_string()))
    }

    /// Aligned CPU/RAM history of a registered host. Empty if it has not
    /// been polled successfully yet.
    pub fn host_history(&self, id: &HostId) -> Result<HistoryView, ServiceError> {
        let host = self.host(id)?;
        Ok(self
            .history()
            .read_current(id, host.generation)
            .unwrap_or_else(|| HistoryView {
                capacity: self.history().capacity(),
                timestamps: Vec::new(),
                cpu_average: Vec::new(),
                ram_usage_percent: Vec::new(),
                cores: 0,
            }))
    }

    /// Usage series of one core, `None` if that core was never observed.
    pub fn core_history(&self, id: &HostId, core: usize) -> Result<Option<Vec<f64>>, ServiceError> {
        let host = self.host(id)?;
        Ok(self.history().read_core_current(id, host.generation, core))
    }

    pub fn refresh_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval_tx.subscribe()
    }

    /// Per-host interval, if one was set.
    pub fn host_interval(&self, id: &HostId) -> Option<Duration> {
        self.host_intervals.get(id).map(|d| *d)
    }

    pub fn dispatch(&self, intent: Intent) -> Result<IntentOutcome, ServiceError> {
        debug!("Dispatching intent {:?}", intent);
        match intent {
            Intent::AddHost {
                address,
                port,
                nickname,
                hostname,
            } => {
                let id = self.registry().add(&address, port, &nickname, &hostname)?;
                Ok(IntentOutcome::HostAdded { id })
            }
            Intent::RemoveHost { id } => {
                let removed = self.registry().remove(&id)?;
                self.history().remove(&id);
                self.host_intervals.remove(&id);
                self.last_attempt.remove(&id);
                self.latest
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .hosts
                    .retain(|h| h.id != id);
                Ok(IntentOutcome::HostRemoved { id, removed })
            }
            Intent::SetRefreshInterval { scope, seconds } => {
                if seconds == 0 {
                    return Err(ServiceError::InvalidInterval(seconds));
                }
                let period = Duration::from_secs(seconds);
                match &scope {
                    IntervalScope::Global => {
                        self.interval_tx.send_replace(period);
                        info!("Global refresh interval set to {}s", seconds);
                    }
                    IntervalScope::Host(id) => {
                        self.host(id)?;
                        self.host_intervals.insert(id.clone(), period);
                        info!("Refresh interval of {} set to {}s", id, seconds);
                    }
                }
                Ok(IntentOutcome::IntervalSet { scope, seconds })
            }
            Intent::UpdateHost {
                id,
                nickname,
                hostname,
            } => {
                let updated = self.registry().update_labels(
                    &id,
                    nickname.as_deref(),
                    hostname.as_deref(),
                )?;
                if !updated {
                    return Err(ServiceError::UnknownHost(id.to_string()));
                }
                Ok(IntentOutcome::HostUpdated { id })
            }
        }
    }

    /// Runs one cycle over the hosts whose own interval has elapsed.
    pub async fn tick(&self) -> SnapshotSet {
        self.cycle(false).await
    }

    /// Runs one cycle over every host, ignoring per-host intervals.
    pub async fn poll_now(&self) -> SnapshotSet {
        self.cycle(true).await
    }

    async fn cycle(&self, force: bool) -> SnapshotSet {
        let _guard = self.cycle_lock.lock().await;

        // Hosts with an interval longer than the tick are skipped until due.
        // Slack absorbs timer jitter so a 6s host on a 3s tick runs every
        // second tick rather than every third.
        let slack = self.refresh_interval() / 10;
        let now = Instant::now();
        let due: AHashSet<HostId> = self
            .registry()
            .list()
            .into_iter()
            .filter(|(id, _)| {
                force
                    || match (self.host_intervals.get(id), self.last_attempt.get(id)) {
                        (Some(interval), Some(last)) => {
                            now.duration_since(*last) + slack >= *interval
                        }
                        _ => true,
                    }
            })
            .map(|(id, _)| id)
            .collect();
        for id in &due {
            self.last_attempt.insert(id.clone(), now);
        }

        let previous = self.snapshots();
        let set = self
            .poller
            .run(&previous, |host: &Host| due.contains(&host.id))
            .await;

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = set.clone();
        set
    }

    /// Spawns the periodic driver. Interval changes take effect from the
    /// moment they are made; a tick that fires while a cycle is running
    /// waits for it instead of starting a second one.
    pub fn spawn_driver(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_rx = service.subscribe_interval();
            let mut period = *interval_rx.borrow_and_update();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Poll driver started, interval {}s", period.as_secs());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        service.tick().await;
                    }
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        period = *interval_rx.borrow_and_update();
                        ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        debug!("Poll driver interval changed to {}s", period.as_secs());
                    }
                }
            }
            info!("Poll driver stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> FleetService {
        let (service, _) = FleetService::open(
            dir.path().join("servers.json"),
            &EngineConfig::default(),
            PollerMetrics::detached().unwrap(),
            Arc::new(PollStats::new()),
        )
        .unwrap();
        service
    }

    fn add(service: &FleetService, address: &str) -> HostId {
        match service
            .dispatch(Intent::AddHost {
                address: address.into(),
                port: 8000,
                nickname: "web".into(),
                hostname: "host".into(),
            })
            .unwrap()
        {
            IntentOutcome::HostAdded { id } => id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_add_and_remove_intents() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let id = add(&service, "10.0.0.5");
        assert_eq!(id.as_str(), "10.0.0.5:8000");
        assert!(service.host(&id).is_ok());

        let outcome = service
            .dispatch(Intent::RemoveHost { id: id.clone() })
            .unwrap();
        assert_eq!(
            outcome,
            IntentOutcome::HostRemoved {
                id: id.clone(),
                removed: true
            }
        );
        assert!(matches!(
            service.host(&id),
            Err(ServiceError::UnknownHost(_))
        ));

        // Removing again is a no-op
        let outcome = service.dispatch(Intent::RemoveHost { id: id.clone() }).unwrap();
        assert_eq!(outcome, IntentOutcome::HostRemoved { id, removed: false });
    }

    #[test]
    fn test_interval_intents() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let id = add(&service, "10.0.0.5");

        service
            .dispatch(Intent::SetRefreshInterval {
                scope: IntervalScope::Global,
                seconds: 10,
            })
            .unwrap();
        assert_eq!(service.refresh_interval(), Duration::from_secs(10));

        service
            .dispatch(Intent::SetRefreshInterval {
                scope: IntervalScope::Host(id.clone()),
                seconds: 30,
            })
            .unwrap();
        assert_eq!(service.host_interval(&id), Some(Duration::from_secs(30)));

        assert!(matches!(
            service.dispatch(Intent::SetRefreshInterval {
                scope: IntervalScope::Global,
                seconds: 0
            }),
            Err(ServiceError::InvalidInterval(0))
        ));
        assert!(matches!(
            service.dispatch(Intent::SetRefreshInterval {
                scope: IntervalScope::Host(HostId::from("1.1.1.1:1")),
                seconds: 5
            }),
            Err(ServiceError::UnknownHost(_))
        ));
    }

    #[test]
    fn test_invalid_add_is_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let err = service
            .dispatch(Intent::AddHost {
                address: "10.0.0.5".into(),
                port: 8000,
                nickname: " ".into(),
                hostname: "host".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Registry(_)));
        assert!(service.registry().is_empty());
    }

    #[test]
    fn test_intent_json_shape() {
        let intent: Intent = serde_json::from_str(
            r#"{"intent":"set_refresh_interval","scope":{"host":"10.0.0.5:8000"},"seconds":5}"#,
        )
        .unwrap();
        assert_eq!(
            intent,
            Intent::SetRefreshInterval {
                scope: IntervalScope::Host(HostId::from("10.0.0.5:8000")),
                seconds: 5
            }
        );
    }

    #[tokio::test]
    async fn test_empty_roster_cycle_is_noop() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let set = service.poll_now().await;
        assert!(set.is_empty());
        assert!(set.taken_at.is_some());
    }

    #[test]
    fn test_history_of_unpolled_host_is_empty() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        let id = add(&service, "10.0.0.5");

        let view = service.host_history(&id).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.capacity, 50);
        assert_eq!(service.core_history(&id, 0).unwrap(), None);
    }
}
