//! History endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use herakles_fleet_monitor::{HistoryView, HostId};
use serde::Serialize;
use tracing::instrument;

use crate::handlers::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct CoreHistory {
    pub id: HostId,
    pub core: usize,
    pub samples: Vec<f64>,
}

/// Handler for `GET /hosts/{id}/history`.
#[instrument(skip(state))]
pub async fn host_history_handler(
    State(state): State<SharedState>,
    Path(id): Path<HostId>,
) -> Result<Json<HistoryView>, ApiError> {
    state.stats.record_http_request();
    Ok(Json(state.service.host_history(&id)?))
}

/// Handler for `GET /hosts/{id}/cores/{core}`.
#[instrument(skip(state))]
pub async fn core_history_handler(
    State(state): State<SharedState>,
    Path((id, core)): Path<(HostId, usize)>,
) -> Result<Json<CoreHistory>, ApiError> {
    state.stats.record_http_request();

    let samples = state
        .service
        .core_history(&id, core)?
        .ok_or_else(|| ApiError::NotFound(format!("core {} of {}", core, id)))?;

    Ok(Json(CoreHistory { id, core, samples }))
}
