//! Roster endpoints.
//!
//! Every mutation goes through `FleetService::dispatch`, so the HTTP layer
//! never touches the registry directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use herakles_fleet_monitor::{Host, HostId, HostSnapshot, Intent, IntentOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::handlers::error::ApiError;
use crate::state::SharedState;

fn default_port() -> u16 {
    herakles_fleet_monitor::registry::DEFAULT_HOST_PORT
}

#[derive(Debug, Deserialize)]
pub struct AddHostRequest {
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub nickname: String,
    pub hostname: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateHostRequest {
    pub nickname: Option<String>,
    pub hostname: Option<String>,
}

/// A host with everything the view layer shows about it.
#[derive(Debug, Serialize)]
pub struct HostDetail {
    #[serde(flatten)]
    pub host: Host,
    pub latest: Option<HostSnapshot>,
    pub refresh_interval_secs: u64,
}

/// Handler for `GET /hosts`.
#[instrument(skip(state))]
pub async fn list_hosts_handler(State(state): State<SharedState>) -> Json<Vec<Host>> {
    debug!("Processing GET /hosts request");
    state.stats.record_http_request();

    Json(
        state
            .service
            .registry()
            .list()
            .into_iter()
            .map(|(_, host)| host)
            .collect(),
    )
}

/// Handler for `POST /hosts`.
#[instrument(skip(state))]
pub async fn add_host_handler(
    State(state): State<SharedState>,
    Json(req): Json<AddHostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.stats.record_http_request();

    let outcome = state.service.dispatch(Intent::AddHost {
        address: req.address,
        port: req.port,
        nickname: req.nickname,
        hostname: req.hostname,
    })?;
    if let IntentOutcome::HostAdded { id } = &outcome {
        info!("Registered host {}", id);
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Handler for `GET /hosts/{id}`.
#[instrument(skip(state))]
pub async fn get_host_handler(
    State(state): State<SharedState>,
    Path(id): Path<HostId>,
) -> Result<Json<HostDetail>, ApiError> {
    state.stats.record_http_request();

    let host = state.service.host(&id)?;
    let refresh_interval_secs = state
        .service
        .host_interval(&id)
        .unwrap_or_else(|| state.service.refresh_interval())
        .as_secs();

    Ok(Json(HostDetail {
        latest: state.service.snapshot(&id),
        host,
        refresh_interval_secs,
    }))
}

/// Handler for `PATCH /hosts/{id}`.
#[instrument(skip(state))]
pub async fn update_host_handler(
    State(state): State<SharedState>,
    Path(id): Path<HostId>,
    Json(req): Json<UpdateHostRequest>,
) -> Result<Json<IntentOutcome>, ApiError> {
    state.stats.record_http_request();

    let outcome = state.service.dispatch(Intent::UpdateHost {
        id,
        nickname: req.nickname,
        hostname: req.hostname,
    })?;
    Ok(Json(outcome))
}

/// Handler for `DELETE /hosts/{id}`. Removing an unknown id is not an error.
#[instrument(skip(state))]
pub async fn remove_host_handler(
    State(state): State<SharedState>,
    Path(id): Path<HostId>,
) -> Result<Json<IntentOutcome>, ApiError> {
    state.stats.record_http_request();

    let outcome = state.service.dispatch(Intent::RemoveHost { id })?;
    if let IntentOutcome::HostRemoved { id, removed: true } = &outcome {
        info!("Removed host {}", id);
    }
    Ok(Json(outcome))
}
