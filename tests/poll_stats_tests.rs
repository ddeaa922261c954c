//! Integration tests for poller statistics.
//!
//! These tests verify that PollStats tracks cycle outcomes and renders the
//! plain-text table served by `/health`.

use herakles_fleet_monitor::{CycleOutcome, PollStats};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_poll_stats_initialize_empty() {
    let stats = PollStats::new();

    let snap = stats.cycle_duration_seconds.snapshot();
    assert_eq!(snap.count, 0);
    assert_eq!(snap.current, 0.0);
    assert_eq!(snap.avg, 0.0);

    assert_eq!(stats.total_cycles.load(Ordering::Relaxed), 0);
    assert_eq!(stats.last_cycle_time_str(), "N/A");
}

#[test]
fn test_record_cycle_accumulates() {
    let stats = PollStats::new();

    stats.record_cycle(
        &CycleOutcome {
            polled: 5,
            healthy: 4,
            degraded: 1,
            unreachable: 1,
            discarded: 0,
            family_failures: 2,
            retries: 3,
        },
        Duration::from_millis(400),
    );
    stats.record_cycle(
        &CycleOutcome {
            polled: 5,
            healthy: 2,
            degraded: 0,
            unreachable: 3,
            discarded: 0,
            family_failures: 0,
            retries: 0,
        },
        Duration::from_millis(200),
    );

    assert_eq!(stats.total_cycles.load(Ordering::Relaxed), 2);
    assert_eq!(stats.healthy_polls.load(Ordering::Relaxed), 6);
    assert_eq!(stats.unreachable_polls.load(Ordering::Relaxed), 4);
    assert_eq!(stats.family_failures.load(Ordering::Relaxed), 2);
    assert_eq!(stats.retries.load(Ordering::Relaxed), 3);

    let healthy = stats.hosts_healthy.snapshot();
    assert_eq!(healthy.current, 2.0);
    assert_eq!(healthy.max, 4.0);
    assert_eq!(healthy.min, 2.0);
    assert_eq!(healthy.avg, 3.0);

    let duration = stats.cycle_duration_seconds.snapshot();
    assert!((duration.avg - 0.3).abs() < 1e-9);

    assert!((stats.reachability_rate() - 60.0).abs() < 1e-9);
    assert_ne!(stats.last_cycle_time_str(), "N/A");
}

#[test]
fn test_render_table_sections() {
    let stats = PollStats::new();
    stats.record_cycle(
        &CycleOutcome {
            polled: 1,
            healthy: 1,
            ..CycleOutcome::default()
        },
        Duration::from_millis(50),
    );
    stats.record_http_request();

    let table = stats.render_table();
    assert!(table.contains("HEALTH ENDPOINT - FLEET POLLER STATS"));
    assert!(table.contains("POLL CYCLES"));
    assert!(table.contains("HOST OUTCOMES"));
    assert!(table.contains("cycle_duration (s)"));
    assert!(table.contains("http_requests_last_minute"));
}

#[test]
fn test_http_requests_are_counted_across_threads() {
    let stats = Arc::new(PollStats::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    stats.record_http_request();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stats.api_calls.load(Ordering::Relaxed), 100);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 100);
}
