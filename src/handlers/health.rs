//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! poller statistics and history buffer usage.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use herakles_fleet_monitor::{format_memory, HistoryStats};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};

use crate::handlers::root::FOOTER_TEXT;
use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.stats.record_http_request();

    let message = if state.stats.total_cycles.load(Ordering::Relaxed) == 0 {
        "OK - Waiting for first poll cycle"
    } else {
        "OK"
    };

    let uptime_hours = state.stats.uptime_seconds() as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    let table = state.stats.render_table();
    let history_section = render_history_stats(&state.service.history().stats());

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUptime: {uptime_str}\nHosts registered: {}\nRefresh interval: {}s\n\n{table}\n{history_section}\n{FOOTER_TEXT}",
            state.service.registry().len(),
            state.service.refresh_interval().as_secs(),
        ),
    )
}

/// Renders history buffer usage as a plain-text block.
fn render_history_stats(stats: &HistoryStats) -> String {
    let (mb, gb) = format_memory(stats.estimated_ram_bytes as f64 / (1024.0 * 1024.0));
    let mut out = String::new();
    writeln!(out, "HISTORY BUFFERS").ok();
    writeln!(out, "===============").ok();
    writeln!(out).ok();
    writeln!(out, "capacity per series:        {}", stats.capacity).ok();
    writeln!(out, "hosts with history:         {}", stats.hosts).ok();
    writeln!(out, "samples stored:             {}", stats.total_samples).ok();
    writeln!(out, "per-core buffers:           {}", stats.core_buffers).ok();
    writeln!(out, "estimated memory:           {} {}", mb, gb).ok();
    out
}
