//! Bounded rolling history per host.
//!
//! Each host gets one `HostHistory`: a ringbuffer of aligned
//! (timestamp, CPU average, RAM percent) samples plus one ringbuffer per CPU
//! core. Core buffers are created the first time a core index is seen and
//! are kept for the rest of the host's lifetime. All buffers share the same
//! capacity.
//!
//! Buffers are tagged with the registration generation of their host. An
//! append carrying a newer generation replaces the old buffers, so a host id
//! that is removed and added again never inherits stale samples.

use ahash::AHashSet;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::host::HostId;
use crate::ringbuffer::Ringbuffer;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HistorySample {
    timestamp_ms: i64,
    cpu_average: f64,
    ram_usage_percent: f64,
}

struct HostHistory {
    generation: u64,
    samples: Ringbuffer<HistorySample>,
    cores: Vec<Ringbuffer<f64>>,
}

impl HostHistory {
    fn new(generation: u64, capacity: usize) -> Self {
        Self {
            generation,
            samples: Ringbuffer::new(capacity),
            cores: Vec::new(),
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.samples.allocated_bytes()
            + self
                .cores
                .iter()
                .map(Ringbuffer::allocated_bytes)
                .sum::<usize>()
    }
}

/// Copy of one host's aligned series, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryView {
    pub capacity: usize,
    pub timestamps: Vec<DateTime<Utc>>,
    pub cpu_average: Vec<f64>,
    pub ram_usage_percent: Vec<f64>,
    /// Number of per-core series available through `read_core`.
    pub cores: usize,
}

impl HistoryView {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub capacity: usize,
    pub hosts: usize,
    pub total_samples: usize,
    pub core_buffers: usize,
    pub estimated_ram_bytes: usize,
}

/// Rolling history for every polled host.
pub struct HistoryStore {
    hosts: DashMap<HostId, HostHistory>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            hosts: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends one successful poll. Returns `false` if the sample belongs to
    /// an older registration of this id and was dropped.
    pub fn append(
        &self,
        id: &HostId,
        generation: u64,
        timestamp: DateTime<Utc>,
        cpu_average: f64,
        cpu_per_core: &[f64],
        ram_usage_percent: f64,
    ) -> bool {
        let mut entry = self
            .hosts
            .entry(id.clone())
            .or_insert_with(|| HostHistory::new(generation, self.capacity));

        if entry.generation != generation {
            if generation < entry.generation {
                return false;
            }
            *entry = HostHistory::new(generation, self.capacity);
        }

        entry.samples.push(HistorySample {
            timestamp_ms: timestamp.timestamp_millis(),
            cpu_average,
            ram_usage_percent,
        });

        while entry.cores.len() < cpu_per_core.len() {
            entry.cores.push(Ringbuffer::new(self.capacity));
        }
        for (core, usage) in cpu_per_core.iter().enumerate() {
            entry.cores[core].push(*usage);
        }
        true
    }

    pub fn read(&self, id: &HostId) -> Option<HistoryView> {
        self.hosts.get(id).map(|h| Self::view(&h, self.capacity))
    }

    /// Like `read`, but only if the buffers belong to `generation`.
    pub fn read_current(&self, id: &HostId, generation: u64) -> Option<HistoryView> {
        self.hosts
            .get(id)
            .filter(|h| h.generation == generation)
            .map(|h| Self::view(&h, self.capacity))
    }

    pub fn read_core(&self, id: &HostId, core: usize) -> Option<Vec<f64>> {
        self.hosts
            .get(id)
            .and_then(|h| h.cores.get(core).map(Ringbuffer::get_history))
    }

    pub fn read_core_current(&self, id: &HostId, generation: u64, core: usize) -> Option<Vec<f64>> {
        self.hosts
            .get(id)
            .filter(|h| h.generation == generation)
            .and_then(|h| h.cores.get(core).map(Ringbuffer::get_history))
    }

    pub fn remove(&self, id: &HostId) -> bool {
        self.hosts.remove(id).is_some()
    }

    /// Drops buffers of every host not in `registered`.
    pub fn retain_hosts<'a>(&self, registered: impl IntoIterator<Item = &'a HostId>) -> usize {
        let keep: AHashSet<&HostId> = registered.into_iter().collect();
        let before = self.hosts.len();
        self.hosts.retain(|id, _| keep.contains(id));
        before - self.hosts.len()
    }

    pub fn stats(&self) -> HistoryStats {
        let mut stats = HistoryStats {
            capacity: self.capacity,
            hosts: 0,
            total_samples: 0,
            core_buffers: 0,
            estimated_ram_bytes: 0,
        };
        for h in self.hosts.iter() {
            stats.hosts += 1;
            stats.total_samples += h.samples.len();
            stats.core_buffers += h.cores.len();
            stats.estimated_ram_bytes += h.allocated_bytes();
        }
        stats
    }

    fn view(h: &HostHistory, capacity: usize) -> HistoryView {
        let samples = h.samples.get_history();
        HistoryView {
            capacity,
            timestamps: samples
                .iter()
                .filter_map(|s| Utc.timestamp_millis_opt(s.timestamp_ms).single())
                .collect(),
            cpu_average: samples.iter().map(|s| s.cpu_average).collect(),
            ram_usage_percent: samples.iter().map(|s| s.ram_usage_percent).collect(),
            cores: h.cores.len(),
        }
    }
}
