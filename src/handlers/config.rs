//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that returns
//! the effective configuration, including the live refresh interval.

use axum::{extract::State, response::IntoResponse, Json};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");
    state.stats.record_http_request();

    // The interval may have been changed at runtime.
    let mut config = state.config.as_ref().clone();
    config.refresh_interval_secs = Some(state.service.refresh_interval().as_secs());

    Json(config)
}
