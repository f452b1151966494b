//! Health statistics and monitoring for the exporter.
//!
//! This module tracks how the sampling cycles are doing: how long they take,
//! how many processes and groups they see, and how many per-process reads
//! fail. The `/health` endpoint renders it as a plain-text table.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use crate::process::{CollectErrors, ReadErrorKind};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push_back(Instant::now());
            // Keep only last 10 minutes of timestamps to avoid unbounded growth
            let cutoff = Instant::now() - Duration::from_secs(600);
            while guard.front().is_some_and(|&t| t < cutoff) {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let cutoff = Instant::now() - Duration::from_secs(60);
            guard.iter().filter(|&&t| t >= cutoff).count() as u64
        } else {
            0
        }
    }
}

/// Summary of one completed sampling cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub duration_seconds: f64,
    pub tracked_processes: u64,
    pub new_processes: u64,
    pub groups: u64,
}

/// Health statistics for the exporter.
pub struct HealthStats {
    // Cycle performance
    pub cycle_duration_seconds: Stat,
    pub tracked_processes: Stat,
    pub new_processes: Stat,
    pub groups: Stat,
    pub cycle_success_count: AtomicU64,
    pub cycle_failure_count: AtomicU64,

    // Error tracking, per read error kind
    pub vanished_count: AtomicU64,
    pub permission_denied_count: AtomicU64,
    pub io_error_count: AtomicU64,
    pub parse_error_count: AtomicU64,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,

    // Timing
    pub start_time: Instant,
    pub last_cycle_time: StdRwLock<Option<Instant>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            cycle_duration_seconds: Stat::default(),
            tracked_processes: Stat::default(),
            new_processes: Stat::default(),
            groups: Stat::default(),
            cycle_success_count: AtomicU64::new(0),
            cycle_failure_count: AtomicU64::new(0),
            vanished_count: AtomicU64::new(0),
            permission_denied_count: AtomicU64::new(0),
            io_error_count: AtomicU64::new(0),
            parse_error_count: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_cycle_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycle_duration_seconds
            .add_sample(report.duration_seconds);
        self.tracked_processes
            .add_sample(report.tracked_processes as f64);
        self.new_processes.add_sample(report.new_processes as f64);
        self.groups.add_sample(report.groups as f64);
        self.cycle_success_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_cycle_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_cycle_failure(&self) {
        self.cycle_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_errors(&self, errors: &CollectErrors) {
        for kind in ReadErrorKind::ALL {
            let n = errors.count(kind) as u64;
            if n > 0 {
                self.read_error_counter(kind).fetch_add(n, Ordering::Relaxed);
            }
        }
    }

    pub fn read_error_counter(&self, kind: ReadErrorKind) -> &AtomicU64 {
        match kind {
            ReadErrorKind::Vanished => &self.vanished_count,
            ReadErrorKind::PermissionDenied => &self.permission_denied_count,
            ReadErrorKind::Io => &self.io_error_count,
            ReadErrorKind::Parse => &self.parse_error_count,
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_cycle_success_rate(&self) -> f64 {
        let success = self.cycle_success_count.load(Ordering::Relaxed);
        let failure = self.cycle_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Seconds since the last successful cycle, if there was one.
    pub fn seconds_since_last_cycle(&self) -> Option<f64> {
        self.last_cycle_time
            .read()
            .ok()
            .and_then(|guard| guard.map(|t| t.elapsed().as_secs_f64()))
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();
        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        let stat_row = |out: &mut String, label: &str, stat: &Stat, precision: usize| {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.p$}", cur, p = precision),
                format!("{:.p$}", avg, p = precision.max(1)),
                format!("{:.p$}", max, p = precision),
                format!("{:.p$}", min, p = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        };
        let value_row = |out: &mut String, label: &str, value: String| {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                value,
                "N/A",
                "N/A",
                "N/A",
                left = left_col,
                col = col_w
            )
            .ok();
        };

        writeln!(out).ok();
        writeln!(out, "CYCLE PERFORMANCE").ok();
        writeln!(out, "-----------------").ok();
        stat_row(&mut out, "cycle_duration (s)", &self.cycle_duration_seconds, 3);
        stat_row(&mut out, "tracked_processes", &self.tracked_processes, 0);
        stat_row(&mut out, "new_processes", &self.new_processes, 0);
        stat_row(&mut out, "groups", &self.groups, 0);
        value_row(
            &mut out,
            "cycle_success_rate (%)",
            format!("{:.1}", self.get_cycle_success_rate()),
        );
        value_row(
            &mut out,
            "last_cycle_age (s)",
            self.seconds_since_last_cycle()
                .map(|s| format!("{:.1}", s))
                .unwrap_or_else(|| "N/A".to_string()),
        );

        writeln!(out).ok();
        writeln!(out, "READ ERRORS (TOTAL)").ok();
        writeln!(out, "-------------------").ok();
        for kind in ReadErrorKind::ALL {
            value_row(
                &mut out,
                kind.as_str(),
                self.read_error_counter(kind)
                    .load(Ordering::Relaxed)
                    .to_string(),
            );
        }

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();
        value_row(
            &mut out,
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        value_row(
            &mut out,
            "metrics_endpoint_calls",
            self.metrics_endpoint_calls
                .load(Ordering::Relaxed)
                .to_string(),
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stat() {
        let mut s = RunningStat::default();
        assert_eq!(s.avg(), 0.0);
        s.add(2.0);
        s.add(4.0);
        s.add(0.0);
        assert_eq!(s.count, 3);
        assert_eq!(s.avg(), 2.0);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.last, 0.0);
    }

    #[test]
    fn test_success_rate_defaults_to_100() {
        let stats = HealthStats::new();
        assert_eq!(stats.get_cycle_success_rate(), 100.0);
        stats.record_cycle(&CycleReport::default());
        stats.record_cycle_failure();
        assert_eq!(stats.get_cycle_success_rate(), 50.0);
    }
}
