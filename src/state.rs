//! Application state management for the fleet monitor.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers alongside the periodic poll driver.

use herakles_fleet_monitor::{FleetService, PollStats};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and the driver task.
pub struct AppState {
    /// Owner of roster, history and poller.
    pub service: Arc<FleetService>,
    /// Prometheus registry holding the poller collectors.
    pub registry: Registry,
    pub stats: Arc<PollStats>,
    pub config: Arc<Config>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
