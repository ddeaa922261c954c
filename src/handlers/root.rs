//! Root endpoint handler.
//!
//! This module provides the `/` endpoint handler that lists
//! all available endpoints as JSON.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/cansp-dev/herakles-fleet-monitor | More info: https://www.herakles.now | Support: exporter@herakles.now";

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.stats.record_http_request();

    let uptime_secs = state.start_time.elapsed().as_secs();
    let uptime_str = format!(
        "{}h {}m {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60
    );

    let mut endpoints = vec![
        json!({"method": "GET", "path": "/", "description": "This index"}),
        json!({"method": "GET", "path": "/config", "description": "Effective configuration"}),
        json!({"method": "GET", "path": "/hosts", "description": "Registered hosts in roster order"}),
        json!({"method": "POST", "path": "/hosts", "description": "Register a host"}),
        json!({"method": "GET", "path": "/hosts/{id}", "description": "One host with its latest snapshot"}),
        json!({"method": "PATCH", "path": "/hosts/{id}", "description": "Change nickname or hostname"}),
        json!({"method": "DELETE", "path": "/hosts/{id}", "description": "Remove a host"}),
        json!({"method": "GET", "path": "/hosts/{id}/history", "description": "CPU and RAM history"}),
        json!({"method": "GET", "path": "/hosts/{id}/cores/{core}", "description": "History of one CPU core"}),
        json!({"method": "PUT", "path": "/hosts/{id}/interval", "description": "Per-host refresh interval"}),
        json!({"method": "GET", "path": "/interval", "description": "Global refresh interval"}),
        json!({"method": "PUT", "path": "/interval", "description": "Change the global refresh interval"}),
        json!({"method": "GET", "path": "/snapshots", "description": "Snapshot set of the last cycle"}),
        json!({"method": "POST", "path": "/poll", "description": "Run a poll cycle now"}),
        json!({"method": "POST", "path": "/intents", "description": "Dispatch a raw intent"}),
    ];
    if state.config.enable_health.unwrap_or(true) {
        endpoints.push(json!({"method": "GET", "path": "/health", "description": "Poller statistics"}));
    }
    if state.config.enable_telemetry.unwrap_or(true) {
        endpoints.push(json!({"method": "GET", "path": "/metrics", "description": "Prometheus metrics"}));
    }

    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_str,
        "hosts": state.service.registry().len(),
        "refresh_interval_secs": state.service.refresh_interval().as_secs(),
        "endpoints": endpoints,
        "footer": FOOTER_TEXT,
    }))
}
