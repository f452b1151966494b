//! Integration tests for group aggregation.
//!
//! Group counts are cumulative and must never decrease, even when members
//! exit or their pids are handed to new processes.

use std::sync::Arc;

use herakles_process_exporter::process::{
    GroupUpdate, Grouper, ProcId, ProcIter, ProcMetrics, ProcReadError, ProcStatic,
    ProcessObservation, ScanError, StaticIter,
};

type RuleFn = fn(&ProcStatic) -> Option<Arc<str>>;

fn obs(pid: u32, start: u64, name: &str, cpu: f64) -> ProcessObservation {
    ProcessObservation::new(
        ProcId::new(pid, start),
        ProcStatic {
            name: name.to_string(),
            parent_pid: 1,
            ..Default::default()
        },
        ProcMetrics {
            cpu_seconds: cpu,
            read_bytes: Some((cpu * 100.0) as u64),
            write_bytes: None,
            ..Default::default()
        },
    )
}

/// Everything named "svc-*" goes to group "svc"; the rest is ignored.
fn svc_only(info: &ProcStatic) -> Option<Arc<str>> {
    if info.name.starts_with("svc-") {
        Some(Arc::from("svc"))
    } else {
        None
    }
}

fn cycle(g: &mut Grouper<RuleFn>, procs: Vec<ProcessObservation>) -> GroupUpdate {
    g.update(StaticIter::new(procs)).expect("scan should complete")
}

fn grouper() -> Grouper<RuleFn> {
    Grouper::new(svc_only as RuleFn, false)
}

struct FailingScan {
    items: std::vec::IntoIter<ProcessObservation>,
}

impl ProcIter for FailingScan {
    fn next_proc(&mut self) -> Option<Result<ProcessObservation, ProcReadError>> {
        self.items.next().map(Ok)
    }

    fn close(&mut self) -> Result<(), ScanError> {
        Err(ScanError::Incomplete("readdir failed".into()))
    }
}

#[test]
fn test_first_cycle_establishes_baseline() {
    let mut g = grouper();
    let update = cycle(&mut g, vec![obs(1, 1, "svc-a", 50.0)]);

    let svc = &update.groups["svc"];
    assert_eq!(svc.procs, 1);
    assert_eq!(svc.counts.cpu_seconds, 0.0);
    assert_eq!(svc.counts.read_bytes, 0);
}

#[test]
fn test_group_counts_survive_member_exit() {
    let mut g = grouper();
    cycle(&mut g, vec![obs(1, 1, "svc-a", 1.0), obs(2, 2, "svc-b", 1.0)]);
    let c2 = cycle(&mut g, vec![obs(1, 1, "svc-a", 2.0), obs(2, 2, "svc-b", 3.0)]);
    assert_eq!(c2.groups["svc"].counts.cpu_seconds, 3.0);

    let c3 = cycle(&mut g, vec![obs(1, 1, "svc-a", 3.0), obs(2, 2, "svc-b", 5.0)]);
    let before = c3.groups["svc"].counts;
    assert_eq!(before.cpu_seconds, 6.0);
    assert_eq!(before.read_bytes, 600);

    // svc-a exits; svc-b grows by one second.
    let c4 = cycle(&mut g, vec![obs(2, 2, "svc-b", 6.0)]);
    let after = &c4.groups["svc"];
    assert_eq!(after.procs, 1);
    assert_eq!(after.counts.cpu_seconds, before.cpu_seconds + 1.0);
    assert_eq!(after.counts.read_bytes, before.read_bytes + 100);
}

#[test]
fn test_stable_group_is_not_double_counted() {
    let mut g = grouper();
    for step in 0..10u32 {
        let update = cycle(
            &mut g,
            vec![
                obs(1, 1, "svc-a", step as f64),
                obs(2, 2, "svc-b", 2.0 * step as f64),
            ],
        );
        let svc = &update.groups["svc"];
        assert_eq!(svc.counts.cpu_seconds, 3.0 * step as f64, "cycle {}", step);
    }
}

#[test]
fn test_group_counts_never_decrease() {
    let mut g = grouper();
    let scans = vec![
        vec![obs(1, 1, "svc-a", 0.0), obs(2, 2, "svc-b", 0.0)],
        vec![obs(1, 1, "svc-a", 4.0), obs(2, 2, "svc-b", 1.0)],
        vec![obs(2, 2, "svc-b", 2.0), obs(3, 3, "svc-c", 9.0)],
        vec![obs(3, 3, "svc-c", 10.0)],
        vec![],
        vec![obs(4, 4, "svc-d", 1.0)],
        vec![obs(4, 4, "svc-d", 3.0)],
    ];

    let mut last = 0.0;
    for (i, scan) in scans.into_iter().enumerate() {
        let update = cycle(&mut g, scan);
        let cpu = update.groups["svc"].counts.cpu_seconds;
        assert!(cpu >= last, "cycle {}: {} < {}", i, cpu, last);
        last = cpu;
    }
    // 4 from svc-a, 2 from svc-b, 1 from svc-c, 2 from svc-d.
    assert_eq!(last, 9.0);
}

#[test]
fn test_group_without_members_keeps_reporting_its_floor() {
    let mut g = grouper();
    cycle(&mut g, vec![obs(1, 1, "svc-a", 1.0)]);
    cycle(&mut g, vec![obs(1, 1, "svc-a", 4.0)]);

    for _ in 0..3 {
        let update = cycle(&mut g, vec![]);
        let svc = &update.groups["svc"];
        assert_eq!(svc.procs, 0);
        assert_eq!(svc.counts.cpu_seconds, 3.0);
        assert_eq!(svc.memory.resident_bytes, 0);
        assert_eq!(svc.oldest_start_time, None);
    }
}

#[test]
fn test_pid_reuse_moves_old_counts_to_floor() {
    let mut g = grouper();
    cycle(&mut g, vec![obs(5, 100, "svc-a", 1.0)]);
    cycle(&mut g, vec![obs(5, 100, "svc-a", 3.0)]);

    // Same pid, new start time: a different process.
    let update = cycle(&mut g, vec![obs(5, 200, "svc-b", 0.5)]);
    assert_eq!(update.new_procs.len(), 1);
    let svc = &update.groups["svc"];
    assert_eq!(svc.procs, 1);
    assert_eq!(svc.counts.cpu_seconds, 2.0);

    let update = cycle(&mut g, vec![obs(5, 200, "svc-b", 1.5)]);
    assert_eq!(update.groups["svc"].counts.cpu_seconds, 3.0);
}

#[test]
fn test_unclassified_processes_are_not_grouped() {
    let mut g = grouper();
    let update = cycle(&mut g, vec![obs(1, 1, "svc-a", 0.0), obs(2, 2, "bash", 0.0)]);
    assert_eq!(update.groups.len(), 1);
    assert_eq!(update.new_procs.len(), 2);
    assert!(g.tracker().is_ignored(&ProcId::new(2, 2)));

    // Ignored processes are not reported as new again.
    let update = cycle(&mut g, vec![obs(1, 1, "svc-a", 1.0), obs(2, 2, "bash", 1.0)]);
    assert!(update.new_procs.is_empty());
    assert_eq!(update.groups["svc"].counts.cpu_seconds, 1.0);
}

#[test]
fn test_incomplete_scan_leaves_groups_intact() {
    let mut g = grouper();
    cycle(&mut g, vec![obs(1, 1, "svc-a", 1.0), obs(2, 2, "svc-b", 1.0)]);
    let c2 = cycle(&mut g, vec![obs(1, 1, "svc-a", 2.0), obs(2, 2, "svc-b", 2.0)]);
    assert_eq!(c2.groups["svc"].counts.cpu_seconds, 2.0);

    // svc-a is missing from a scan that never completed.
    let failed = g.update(FailingScan {
        items: vec![obs(2, 2, "svc-b", 3.0)].into_iter(),
    });
    assert!(failed.is_err());
    assert_eq!(g.tracker().len(), 2);

    let c3 = cycle(&mut g, vec![obs(1, 1, "svc-a", 2.0), obs(2, 2, "svc-b", 3.0)]);
    let svc = &c3.groups["svc"];
    assert_eq!(svc.procs, 2);
    assert_eq!(svc.counts.cpu_seconds, 3.0);
}

/// Runs two clean cycles for svc-a and svc-b, then a scan that fails to close
/// after reading both at 5 seconds.
fn grouper_after_failed_scan() -> Grouper<RuleFn> {
    let mut g = grouper();
    cycle(&mut g, vec![obs(1, 1, "svc-a", 1.0), obs(2, 2, "svc-b", 1.0)]);
    let c2 = cycle(&mut g, vec![obs(1, 1, "svc-a", 2.0), obs(2, 2, "svc-b", 2.0)]);
    assert_eq!(c2.groups["svc"].counts.cpu_seconds, 2.0);

    let failed = g.update(FailingScan {
        items: vec![obs(1, 1, "svc-a", 5.0), obs(2, 2, "svc-b", 5.0)].into_iter(),
    });
    assert!(failed.is_err());
    g
}

#[test]
fn test_member_exit_after_failed_scan() {
    let mut g = grouper_after_failed_scan();

    // svc-a exits before a complete scan ever confirmed its reading of 5.
    let update = cycle(&mut g, vec![obs(2, 2, "svc-b", 5.0)]);
    let svc = &update.groups["svc"];
    assert_eq!(svc.procs, 1);
    // svc-a: 1 from the clean cycles. svc-b: 1 + 3 confirmed by this scan.
    assert_eq!(svc.counts.cpu_seconds, 5.0);

    let update = cycle(&mut g, vec![obs(2, 2, "svc-b", 6.0)]);
    assert_eq!(update.groups["svc"].counts.cpu_seconds, 6.0);
}

#[test]
fn test_member_survives_failed_scan() {
    let mut g = grouper_after_failed_scan();

    let update = cycle(&mut g, vec![obs(1, 1, "svc-a", 5.0), obs(2, 2, "svc-b", 5.0)]);
    let svc = &update.groups["svc"];
    assert_eq!(svc.procs, 2);
    assert_eq!(svc.counts.cpu_seconds, 8.0);

    // Exiting now hands the confirmed counts to the floor unchanged.
    let update = cycle(&mut g, vec![obs(2, 2, "svc-b", 5.0)]);
    assert_eq!(update.groups["svc"].counts.cpu_seconds, 8.0);
}
