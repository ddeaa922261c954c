//! In-process stand-in for the remote metrics API.
//!
//! Each `MockHost` is an axum server on `127.0.0.1:0` whose responses can be
//! steered per test through atomics.

#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use herakles_fleet_monitor::{EngineConfig, FetchConfig, HistoryConfig, PollConfig, RetryConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
pub struct MockControl {
    /// Status of `/health`; 0 means 200.
    pub health_status: AtomicU16,
    pub health_delay_ms: AtomicU64,
    pub health_calls: AtomicUsize,
    pub health_in_flight: AtomicUsize,
    /// Highest number of `/health` requests served at the same time.
    pub health_max_in_flight: AtomicUsize,

    /// Number of 503 responses before the CPU endpoint succeeds.
    pub cpu_failures: AtomicUsize,
    pub cpu_calls: AtomicUsize,
    /// Raw CPU body; `None` serves the default two-window payload.
    pub cpu_body: Mutex<Option<String>>,

    /// Status of `/metrics/v1/ram/info`; 0 means 200.
    pub ram_info_status: AtomicU16,
    pub ram_info_calls: AtomicUsize,
}

pub struct MockHost {
    pub port: u16,
    pub control: Arc<MockControl>,
}

pub fn cpu_payload() -> Value {
    json!({
        "cpu_usage_1": [{"core": 0, "usage": 10.0}, {"core": 1, "usage": 30.0}],
        "cpu_usage_2": [{"core": 0, "usage": 20.0}, {"core": 1, "usage": 50.0}]
    })
}

async fn health(State(ctl): State<Arc<MockControl>>) -> impl IntoResponse {
    ctl.health_calls.fetch_add(1, Ordering::SeqCst);
    let in_flight = ctl.health_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    ctl.health_max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

    let delay = ctl.health_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    ctl.health_in_flight.fetch_sub(1, Ordering::SeqCst);
    match ctl.health_status.load(Ordering::SeqCst) {
        0 => (StatusCode::OK, "OK"),
        code => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
            "down",
        ),
    }
}

async fn cpu(State(ctl): State<Arc<MockControl>>) -> axum::response::Response {
    let call = ctl.cpu_calls.fetch_add(1, Ordering::SeqCst);
    if call < ctl.cpu_failures.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    let body = ctl.cpu_body.lock().unwrap().clone();
    match body {
        Some(raw) => (
            StatusCode::OK,
            [("Content-Type", "application/json")],
            raw,
        )
            .into_response(),
        None => Json(cpu_payload()).into_response(),
    }
}

async fn ram_info(State(ctl): State<Arc<MockControl>>) -> axum::response::Response {
    ctl.ram_info_calls.fetch_add(1, Ordering::SeqCst);
    match ctl.ram_info_status.load(Ordering::SeqCst) {
        0 => Json(json!({"total": 8000.0, "used": 2000.0, "available": 6000.0, "free": 5000.0}))
            .into_response(),
        code => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

async fn ram_usage() -> Json<Value> {
    Json(json!([{"usage": 42.5}, {"usage": 99.0}]))
}

async fn logs() -> Json<Value> {
    Json(json!({
        "total_requests": 120,
        "success_count": 110,
        "error_count": 10,
        "status_codes": {"200": 110, "500": 10},
        "top_urls": [{"url": "/", "count": 80}],
        "recent_errors": [{"timestamp": "2024-01-01T00:00:00Z", "ip": "10.0.0.9", "url": "/x", "status_code": 500}]
    }))
}

impl MockHost {
    pub async fn spawn() -> Self {
        let control = Arc::new(MockControl::default());
        let app = Router::new()
            .route("/health", get(health))
            .route("/metrics/v1/cpu/usage", get(cpu))
            .route("/metrics/v1/ram/info", get(ram_info))
            .route("/metrics/v1/ram/usage", get(ram_usage))
            .route("/metrics/v1/logs/metrics", get(logs))
            .with_state(control.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { port, control }
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Fetch settings with millisecond backoffs so retries stay fast.
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        health_timeout_secs: 2,
        metrics_connect_timeout_secs: 2,
        metrics_timeout_secs: 5,
        host_deadline_secs: 30,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 10,
            multiplier: 2.0,
            max_backoff_ms: 40,
            jitter: false,
        },
    }
}

pub fn fast_engine_config(history_capacity: usize) -> EngineConfig {
    EngineConfig {
        fetch: fast_fetch_config(),
        history: HistoryConfig {
            capacity: history_capacity,
        },
        poll: PollConfig::default(),
    }
}
