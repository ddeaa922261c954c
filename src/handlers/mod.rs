//! HTTP endpoint handlers for the fleet monitor.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Endpoint index
//! - `/health`: Poller statistics as a plain-text table
//! - `/metrics`: Prometheus metrics of the poller itself
//! - `/config`: Effective configuration
//! - `/hosts`, `/hosts/{id}`: Roster management
//! - `/snapshots`, `/poll`: Latest snapshot set and manual poll trigger
//! - `/hosts/{id}/history`, `/hosts/{id}/cores/{core}`: Rolling history
//! - `/interval`, `/hosts/{id}/interval`: Refresh intervals
//! - `/intents`: Raw intent dispatch

pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod hosts;
pub mod interval;
pub mod metrics;
pub mod root;
pub mod snapshots;

// Re-export handlers
pub use config::config_handler;
pub use health::health_handler;
pub use history::{core_history_handler, host_history_handler};
pub use hosts::{
    add_host_handler, get_host_handler, list_hosts_handler, remove_host_handler,
    update_host_handler,
};
pub use interval::{global_interval_handler, host_interval_handler, set_global_interval_handler};
pub use metrics::metrics_handler;
pub use root::root_handler;
pub use snapshots::{intent_handler, poll_handler, snapshots_handler};
