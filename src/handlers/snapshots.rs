//! Snapshot endpoints and the raw intent endpoint.

use axum::{extract::State, Json};
use herakles_fleet_monitor::{Intent, IntentOutcome, SnapshotSet};
use tracing::{debug, instrument};

use crate::handlers::error::ApiError;
use crate::state::SharedState;

/// Handler for `GET /snapshots`: the set produced by the last cycle.
#[instrument(skip(state))]
pub async fn snapshots_handler(State(state): State<SharedState>) -> Json<SnapshotSet> {
    debug!("Processing GET /snapshots request");
    state.stats.record_http_request();
    Json(state.service.snapshots())
}

/// Handler for `POST /poll`. Waits for a running cycle to finish first.
#[instrument(skip(state))]
pub async fn poll_handler(State(state): State<SharedState>) -> Json<SnapshotSet> {
    debug!("Manual poll requested");
    state.stats.record_http_request();
    Json(state.service.poll_now().await)
}

/// Handler for `POST /intents`.
#[instrument(skip(state))]
pub async fn intent_handler(
    State(state): State<SharedState>,
    Json(intent): Json<Intent>,
) -> Result<Json<IntentOutcome>, ApiError> {
    state.stats.record_http_request();
    Ok(Json(state.service.dispatch(intent)?))
}
