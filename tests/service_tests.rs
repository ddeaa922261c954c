//! Integration tests for the fleet service.
//!
//! These tests cover intent dispatch against live hosts, per-host refresh
//! throttling and the periodic driver.

mod common;

use common::{fast_engine_config, MockHost};
use herakles_fleet_monitor::{
    FleetService, HostId, Intent, IntentOutcome, IntervalScope, PollStats, PollerMetrics,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn open_service(dir: &TempDir) -> FleetService {
    let (service, _) = FleetService::open(
        dir.path().join("servers.json"),
        &fast_engine_config(50),
        PollerMetrics::detached().unwrap(),
        Arc::new(PollStats::new()),
    )
    .unwrap();
    service
}

fn add(service: &FleetService, port: u16, nickname: &str) -> HostId {
    match service
        .dispatch(Intent::AddHost {
            address: "127.0.0.1".into(),
            port,
            nickname: nickname.into(),
            hostname: "mock".into(),
        })
        .unwrap()
    {
        IntentOutcome::HostAdded { id } => id,
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_host_not_due_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let slow = MockHost::spawn().await;
    let fast = MockHost::spawn().await;
    let slow_id = add(&service, slow.port, "slow");
    let fast_id = add(&service, fast.port, "fast");

    service
        .dispatch(Intent::SetRefreshInterval {
            scope: IntervalScope::Host(slow_id.clone()),
            seconds: 3600,
        })
        .unwrap();

    let first = service.tick().await;
    let first_seen = first
        .get(&slow_id)
        .and_then(|h| h.snapshot.as_ref())
        .map(|s| s.observed_at)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = service.tick().await;

    let slow_entry = second.get(&slow_id).unwrap();
    assert!(!slow_entry.fresh);
    assert_eq!(
        slow_entry.snapshot.as_ref().unwrap().observed_at,
        first_seen
    );
    assert!(second.get(&fast_id).unwrap().fresh);

    assert_eq!(slow.control.health_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fast.control.health_calls.load(Ordering::SeqCst), 2);
    assert_eq!(service.host_history(&slow_id).unwrap().len(), 1);
    assert_eq!(service.host_history(&fast_id).unwrap().len(), 2);

    // A manual poll ignores per-host intervals
    let forced = service.poll_now().await;
    assert!(forced.get(&slow_id).unwrap().fresh);
    assert_eq!(slow.control.health_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_remove_intent_clears_snapshot_and_history() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let mock = MockHost::spawn().await;
    let id = add(&service, mock.port, "web");

    service.poll_now().await;
    assert!(service.snapshot(&id).is_some());
    assert_eq!(service.core_history(&id, 0).unwrap(), Some(vec![15.0]));

    service
        .dispatch(Intent::RemoveHost { id: id.clone() })
        .unwrap();
    assert!(service.snapshot(&id).is_none());
    assert!(service.history().read(&id).is_none());
    assert!(service.host_history(&id).is_err());
}

#[tokio::test]
async fn test_update_host_keeps_history() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let mock = MockHost::spawn().await;
    let id = add(&service, mock.port, "web");
    service.poll_now().await;

    service
        .dispatch(Intent::UpdateHost {
            id: id.clone(),
            nickname: Some("renamed".into()),
            hostname: None,
        })
        .unwrap();

    let host = service.host(&id).unwrap();
    assert_eq!(host.nickname, "renamed");
    assert_eq!(host.hostname, "mock");
    assert_eq!(service.host_history(&id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_driver_polls_periodically() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(open_service(&dir));
    let mock = MockHost::spawn().await;
    let id = add(&service, mock.port, "web");

    service
        .dispatch(Intent::SetRefreshInterval {
            scope: IntervalScope::Global,
            seconds: 1,
        })
        .unwrap();

    let driver = service.spawn_driver();
    tokio::time::sleep(Duration::from_millis(1600)).await;
    driver.abort();

    // First tick fires immediately, the second after one second
    assert!(mock.control.health_calls.load(Ordering::SeqCst) >= 2);
    assert!(service.host_history(&id).unwrap().len() >= 2);
    assert!(service.snapshots().get(&id).is_some());
}

#[tokio::test]
async fn test_manual_poll_waits_for_running_cycle() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let mock = MockHost::spawn().await;
    mock.control.health_delay_ms.store(200, Ordering::SeqCst);
    let id = add(&service, mock.port, "web");

    let start = std::time::Instant::now();
    let (ticked, forced) = tokio::join!(service.tick(), service.poll_now());

    // Both cycles fetched the host, one after the other
    assert_eq!(mock.control.health_calls.load(Ordering::SeqCst), 2);
    assert_eq!(mock.control.health_max_in_flight.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() >= Duration::from_millis(400));

    assert!(ticked.get(&id).unwrap().fresh);
    assert!(forced.get(&id).unwrap().fresh);
    assert_eq!(service.host_history(&id).unwrap().len(), 2);
}
