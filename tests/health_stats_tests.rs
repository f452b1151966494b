//! Integration tests for health stats module.
//!
//! These tests verify that the HealthStats structure correctly tracks
//! cycle statistics and per-kind read errors, and renders them.

use herakles_process_exporter::health_stats::{CycleReport, HealthStats};
use herakles_process_exporter::process::{CollectErrors, ProcReadError, ReadErrorKind};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_health_stats_initialize_empty() {
    let stats = HealthStats::new();

    let (cur, avg, _, _, count) = stats.cycle_duration_seconds.snapshot();
    assert_eq!(count, 0);
    assert_eq!(cur, 0.0);
    assert_eq!(avg, 0.0);

    for kind in ReadErrorKind::ALL {
        assert_eq!(stats.read_error_counter(kind).load(Ordering::Relaxed), 0);
    }
    assert!(stats.seconds_since_last_cycle().is_none());
}

#[test]
fn test_record_cycle_updates_running_stats() {
    let stats = HealthStats::new();
    stats.record_cycle(&CycleReport {
        duration_seconds: 0.2,
        tracked_processes: 100,
        new_processes: 100,
        groups: 5,
    });
    stats.record_cycle(&CycleReport {
        duration_seconds: 0.1,
        tracked_processes: 102,
        new_processes: 4,
        groups: 6,
    });

    let (cur, avg, max, min, count) = stats.tracked_processes.snapshot();
    assert_eq!(count, 2);
    assert_eq!(cur, 102.0);
    assert_eq!(avg, 101.0);
    assert_eq!(max, 102.0);
    assert_eq!(min, 100.0);

    let (_, _, max_new, min_new, _) = stats.new_processes.snapshot();
    assert_eq!(max_new, 100.0);
    assert_eq!(min_new, 4.0);

    assert_eq!(stats.cycle_success_count.load(Ordering::Relaxed), 2);
    assert!(stats.seconds_since_last_cycle().is_some());
}

#[test]
fn test_read_errors_counted_per_kind() {
    let stats = HealthStats::new();
    let mut errors = CollectErrors::default();
    errors.record(ProcReadError::new(10, ReadErrorKind::Vanished, "gone"));
    errors.record(ProcReadError::new(11, ReadErrorKind::Vanished, "gone"));
    errors.record(ProcReadError::new(12, ReadErrorKind::PermissionDenied, "denied"));

    stats.record_read_errors(&errors);
    stats.record_read_errors(&errors);

    assert_eq!(stats.vanished_count.load(Ordering::Relaxed), 4);
    assert_eq!(stats.permission_denied_count.load(Ordering::Relaxed), 2);
    assert_eq!(stats.io_error_count.load(Ordering::Relaxed), 0);
    assert_eq!(stats.parse_error_count.load(Ordering::Relaxed), 0);
}

#[test]
fn test_failures_lower_success_rate() {
    let stats = HealthStats::new();
    for _ in 0..3 {
        stats.record_cycle(&CycleReport::default());
    }
    stats.record_cycle_failure();

    assert_eq!(stats.cycle_failure_count.load(Ordering::Relaxed), 1);
    assert_eq!(stats.get_cycle_success_rate(), 75.0);
}

#[test]
fn test_render_table_contains_sections() {
    let stats = HealthStats::new();
    stats.record_cycle(&CycleReport {
        duration_seconds: 0.05,
        tracked_processes: 12,
        new_processes: 12,
        groups: 3,
    });
    stats.record_metrics_endpoint_call();

    let table = stats.render_table();
    assert!(table.contains("CYCLE PERFORMANCE"));
    assert!(table.contains("READ ERRORS (TOTAL)"));
    assert!(table.contains("HTTP SERVER"));
    assert!(table.contains("tracked_processes"));
    assert!(table.contains("permission_denied"));
}

#[test]
fn test_health_stats_shared_across_threads() {
    let stats = Arc::new(HealthStats::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    stats.record_cycle(&CycleReport::default());
                    stats.record_http_request();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread panicked");
    }

    assert_eq!(stats.cycle_success_count.load(Ordering::Relaxed), 100);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 100);
}
