//! Running statistics about the poller, rendered by the `/health` endpoint.
//!
//! Tracks cycle timing, per-cycle host outcomes and request counters.
//! Values are kept as current/average/max/min triples so a plain-text table
//! can show both the latest cycle and the trend since startup.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Point-in-time copy of a `Stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSnapshot {
    pub current: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        match self.inner.lock() {
            Ok(s) => StatSnapshot {
                current: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            },
            Err(_) => StatSnapshot::default(),
        }
    }
}

/// Sliding window of request instants (last 10 minutes).
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            if let Some(cutoff) = now.checked_sub(Duration::from_secs(600)) {
                while guard.front().is_some_and(|&t| t < cutoff) {
                    guard.pop_front();
                }
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        match self.inner.lock() {
            Ok(guard) => match Instant::now().checked_sub(Duration::from_secs(60)) {
                Some(cutoff) => guard.iter().filter(|&&t| t >= cutoff).count() as u64,
                None => guard.len() as u64,
            },
            Err(_) => 0,
        }
    }
}

/// Outcome counts of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Hosts fetched this cycle (hosts not yet due are not counted).
    pub polled: usize,
    /// Includes degraded hosts.
    pub healthy: usize,
    pub degraded: usize,
    pub unreachable: usize,
    /// Results dropped because the host was removed mid-fetch.
    pub discarded: usize,
    pub family_failures: usize,
    pub retries: u64,
}

/// Poller statistics since process start.
pub struct PollStats {
    pub hosts_polled: Stat,
    pub hosts_healthy: Stat,
    pub cycle_duration_seconds: Stat,
    pub total_cycles: AtomicU64,

    pub healthy_polls: AtomicU64,
    pub degraded_polls: AtomicU64,
    pub unreachable_polls: AtomicU64,
    pub discarded_results: AtomicU64,
    pub family_failures: AtomicU64,
    pub retries: AtomicU64,

    pub http_request_timestamps: RequestTimestamps,
    pub api_calls: AtomicU64,

    pub start_time: Instant,
    pub last_cycle_time: StdRwLock<Option<DateTime<Utc>>>,
}

impl Default for PollStats {
    fn default() -> Self {
        Self {
            hosts_polled: Stat::default(),
            hosts_healthy: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            total_cycles: AtomicU64::new(0),
            healthy_polls: AtomicU64::new(0),
            degraded_polls: AtomicU64::new(0),
            unreachable_polls: AtomicU64::new(0),
            discarded_results: AtomicU64::new(0),
            family_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            api_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_cycle_time: StdRwLock::new(None),
        }
    }
}

impl PollStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, outcome: &CycleOutcome, duration: Duration) {
        self.hosts_polled.add_sample(outcome.polled as f64);
        self.hosts_healthy.add_sample(outcome.healthy as f64);
        self.cycle_duration_seconds.add_sample(duration.as_secs_f64());
        self.total_cycles.fetch_add(1, Ordering::Relaxed);

        self.healthy_polls
            .fetch_add(outcome.healthy as u64, Ordering::Relaxed);
        self.degraded_polls
            .fetch_add(outcome.degraded as u64, Ordering::Relaxed);
        self.unreachable_polls
            .fetch_add(outcome.unreachable as u64, Ordering::Relaxed);
        self.discarded_results
            .fetch_add(outcome.discarded as u64, Ordering::Relaxed);
        self.family_failures
            .fetch_add(outcome.family_failures as u64, Ordering::Relaxed);
        self.retries.fetch_add(outcome.retries, Ordering::Relaxed);

        if let Ok(mut guard) = self.last_cycle_time.write() {
            *guard = Some(Utc::now());
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of fetches whose health probe succeeded.
    pub fn reachability_rate(&self) -> f64 {
        let healthy = self.healthy_polls.load(Ordering::Relaxed);
        let unreachable = self.unreachable_polls.load(Ordering::Relaxed);
        let total = healthy + unreachable;
        if total == 0 {
            100.0
        } else {
            (healthy as f64 / total as f64) * 100.0
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn last_cycle_time_str(&self) -> String {
        match self.last_cycle_time.read() {
            Ok(guard) => guard
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let left_col = 28usize;
        let col_w = 12usize;
        let mut out = String::new();

        let row = |out: &mut String, name: &str, s: StatSnapshot, precision: usize| {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                format!("{:.p$}", s.current, p = precision),
                format!("{:.p$}", s.avg, p = precision.max(1)),
                format!("{:.p$}", s.max, p = precision),
                format!("{:.p$}", s.min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        };
        let counter = |out: &mut String, name: &str, value: String| {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                value,
                "N/A",
                "N/A",
                "N/A",
                left = left_col,
                col = col_w
            )
            .ok();
        };

        writeln!(out, "HEALTH ENDPOINT - FLEET POLLER STATS").ok();
        writeln!(out, "====================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "POLL CYCLES").ok();
        writeln!(out, "-----------").ok();
        row(&mut out, "hosts_polled", self.hosts_polled.snapshot(), 0);
        row(&mut out, "hosts_healthy", self.hosts_healthy.snapshot(), 0);
        row(
            &mut out,
            "cycle_duration (s)",
            self.cycle_duration_seconds.snapshot(),
            3,
        );
        counter(
            &mut out,
            "total_cycles",
            self.total_cycles.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(out, "HOST OUTCOMES").ok();
        writeln!(out, "-------------").ok();
        counter(
            &mut out,
            "reachability_rate (%)",
            format!("{:.1}", self.reachability_rate()),
        );
        counter(
            &mut out,
            "degraded_polls",
            self.degraded_polls.load(Ordering::Relaxed).to_string(),
        );
        counter(
            &mut out,
            "unreachable_polls",
            self.unreachable_polls.load(Ordering::Relaxed).to_string(),
        );
        counter(
            &mut out,
            "family_failures",
            self.family_failures.load(Ordering::Relaxed).to_string(),
        );
        counter(
            &mut out,
            "retries",
            self.retries.load(Ordering::Relaxed).to_string(),
        );
        counter(
            &mut out,
            "discarded_results",
            self.discarded_results.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();
        counter(
            &mut out,
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        counter(
            &mut out,
            "api_calls",
            self.api_calls.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(out, "uptime: {}s", self.uptime_seconds()).ok();
        writeln!(out, "last_cycle: {}", self.last_cycle_time_str()).ok();

        out
    }
}
