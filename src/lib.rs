//! Herakles Fleet Monitor Library
//!
//! The polling engine behind the fleet monitor: a durable host roster, a
//! resilient per-host fetch pipeline, CPU/RAM/log normalization and bounded
//! rolling history. It is framework-agnostic; the binary in this package
//! wraps it in an axum JSON API and a periodic driver.
//!
//! # Features
//!
//! - **Durable roster**: every mutation is written atomically (stage, then rename)
//! - **Resilient fetches**: health probe first, then four metric families in
//!   parallel, each with its own retry/backoff and fallback default
//! - **Per-core aggregation**: tolerant decoding of several CPU payload shapes
//! - **Bounded history**: fixed-capacity ringbuffers per host and per core
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use herakles_fleet_monitor::{EngineConfig, FleetService, Intent, PollStats, PollerMetrics};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (service, _outcome) = FleetService::open(
//!     "servers.json",
//!     &EngineConfig::default(),
//!     PollerMetrics::detached()?,
//!     Arc::new(PollStats::new()),
//! )?;
//!
//! service.dispatch(Intent::AddHost {
//!     address: "10.0.0.5".into(),
//!     port: 8000,
//!     nickname: "web1".into(),
//!     hostname: "host5".into(),
//! })?;
//!
//! let set = service.poll_now().await;
//! for host in &set.hosts {
//!     println!("{}: healthy={}", host.id, host.snapshot.as_ref().is_some_and(|s| s.health));
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod engine_config;
pub mod error;
pub mod fetcher;
pub mod history;
pub mod host;
pub mod metrics;
pub mod poll_cycle;
pub mod poll_stats;
pub mod registry;
pub mod retry;
pub mod ringbuffer;
pub mod service;

// Re-export main types for convenience
pub use aggregator::{format_memory, CpuReading, LogSummary, RamReading, Readings};
pub use engine_config::{EngineConfig, FetchConfig, HistoryConfig, PollConfig};
pub use error::{FetchError, RegistryError, ServiceError, ValidationError};
pub use fetcher::{FailureKind, Family, FamilyFailure, Fetcher, MetricsSnapshot};
pub use history::{HistoryStats, HistoryStore, HistoryView};
pub use host::{CpuInfo, Host, HostId, RamInfo};
pub use metrics::PollerMetrics;
pub use poll_cycle::{HostSnapshot, PollCycle, SnapshotSet};
pub use poll_stats::{CycleOutcome, PollStats};
pub use registry::{LoadOutcome, Registry};
pub use retry::{RetryConfig, RetryPolicy};
pub use service::{FleetService, Intent, IntentOutcome, IntervalScope};
