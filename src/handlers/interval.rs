//! Refresh interval endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use herakles_fleet_monitor::{HostId, Intent, IntentOutcome, IntervalScope};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::handlers::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub seconds: u64,
}

/// Handler for `GET /interval`.
#[instrument(skip(state))]
pub async fn global_interval_handler(State(state): State<SharedState>) -> Json<Value> {
    state.stats.record_http_request();
    Json(json!({ "seconds": state.service.refresh_interval().as_secs() }))
}

/// Handler for `PUT /interval`. Takes effect at the next tick.
#[instrument(skip(state))]
pub async fn set_global_interval_handler(
    State(state): State<SharedState>,
    Json(req): Json<IntervalRequest>,
) -> Result<Json<IntentOutcome>, ApiError> {
    state.stats.record_http_request();
    let outcome = state.service.dispatch(Intent::SetRefreshInterval {
        scope: IntervalScope::Global,
        seconds: req.seconds,
    })?;
    Ok(Json(outcome))
}

/// Handler for `PUT /hosts/{id}/interval`.
#[instrument(skip(state))]
pub async fn host_interval_handler(
    State(state): State<SharedState>,
    Path(id): Path<HostId>,
    Json(req): Json<IntervalRequest>,
) -> Result<Json<IntentOutcome>, ApiError> {
    state.stats.record_http_request();
    let outcome = state.service.dispatch(Intent::SetRefreshInterval {
        scope: IntervalScope::Host(id),
        seconds: req.seconds,
    })?;
    Ok(Json(outcome))
}
