//! Prometheus metrics definitions for herakles-process-exporter.
//!
//! Group-level metrics carry a single `groupname` label. Cumulative group
//! counters are never decremented by the engine, so they are exported as
//! counters with the reset + `inc_by` pattern on every scrape.

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Opts, Registry};

use herakles_process_exporter::process::{CollectErrors, GroupByName, ReadErrorKind};

/// Group metrics plus the exporter's own telemetry.
#[derive(Clone)]
pub struct GroupMetrics {
    // ========== Group Metrics ==========
    pub num_procs: GaugeVec,
    pub cpu_seconds_total: CounterVec,
    pub read_bytes_total: CounterVec,
    pub write_bytes_total: CounterVec,
    pub major_page_faults_total: CounterVec,
    pub minor_page_faults_total: CounterVec,
    pub memory_bytes: GaugeVec, // labels: groupname, memtype
    pub open_filedesc: GaugeVec,
    pub worst_fd_ratio: GaugeVec,
    pub num_threads: GaugeVec,
    pub oldest_start_time_seconds: GaugeVec,

    // ========== Exporter Telemetry ==========
    pub scrape_errors_total: Counter,
    pub read_errors_total: CounterVec, // labels: kind
    pub cycle_duration_seconds: Gauge,
    pub cycle_success: Gauge,
    pub scrape_duration_seconds: Gauge,
    pub tracked_processes: Gauge,
}

fn group_gauge(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(Opts::new(name, help), &["groupname"])
}

fn group_counter(name: &str, help: &str) -> Result<CounterVec, prometheus::Error> {
    CounterVec::new(Opts::new(name, help), &["groupname"])
}

impl GroupMetrics {
    /// Creates and registers all Prometheus metrics with the registry.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        // ========== Group Metrics ==========
        let num_procs = group_gauge(
            "herakles_group_num_procs",
            "Number of live processes in the group",
        )?;
        let cpu_seconds_total = group_counter(
            "herakles_group_cpu_seconds_total",
            "CPU time consumed by the group, including exited members",
        )?;
        let read_bytes_total = group_counter(
            "herakles_group_read_bytes_total",
            "Bytes read from storage by the group, including exited members",
        )?;
        let write_bytes_total = group_counter(
            "herakles_group_write_bytes_total",
            "Bytes written to storage by the group, including exited members",
        )?;
        let major_page_faults_total = group_counter(
            "herakles_group_major_page_faults_total",
            "Major page faults of the group, including exited members",
        )?;
        let minor_page_faults_total = group_counter(
            "herakles_group_minor_page_faults_total",
            "Minor page faults of the group, including exited members",
        )?;
        let memory_bytes = GaugeVec::new(
            Opts::new(
                "herakles_group_memory_bytes",
                "Memory of live group members by type (resident, virtual)",
            ),
            &["groupname", "memtype"],
        )?;
        let open_filedesc = group_gauge(
            "herakles_group_open_filedesc",
            "Open file descriptors of live group members",
        )?;
        let worst_fd_ratio = group_gauge(
            "herakles_group_worst_fd_ratio",
            "Highest open/limit file descriptor ratio among live group members",
        )?;
        let num_threads = group_gauge(
            "herakles_group_num_threads",
            "Threads of live group members",
        )?;
        let oldest_start_time_seconds = group_gauge(
            "herakles_group_oldest_start_time_seconds",
            "Start time (unix seconds) of the oldest live group member",
        )?;

        // ========== Exporter Telemetry ==========
        let scrape_errors_total = Counter::new(
            "herakles_exporter_scrape_errors_total",
            "Sampling cycles that failed because the process scan was incomplete",
        )?;
        let read_errors_total = CounterVec::new(
            Opts::new(
                "herakles_exporter_read_errors_total",
                "Per-process read failures by kind",
            ),
            &["kind"],
        )?;
        let cycle_duration_seconds = Gauge::new(
            "herakles_exporter_cycle_duration_seconds",
            "Duration of the last sampling cycle",
        )?;
        let cycle_success = Gauge::new(
            "herakles_exporter_cycle_success",
            "Whether the last sampling cycle was successful (1) or failed (0)",
        )?;
        let scrape_duration_seconds = Gauge::new(
            "herakles_exporter_scrape_duration_seconds",
            "Time spent serving /metrics request (reading from the last snapshot)",
        )?;
        let tracked_processes = Gauge::new(
            "herakles_exporter_tracked_processes",
            "Number of processes currently tracked",
        )?;

        registry.register(Box::new(num_procs.clone()))?;
        registry.register(Box::new(cpu_seconds_total.clone()))?;
        registry.register(Box::new(read_bytes_total.clone()))?;
        registry.register(Box::new(write_bytes_total.clone()))?;
        registry.register(Box::new(major_page_faults_total.clone()))?;
        registry.register(Box::new(minor_page_faults_total.clone()))?;
        registry.register(Box::new(memory_bytes.clone()))?;
        registry.register(Box::new(open_filedesc.clone()))?;
        registry.register(Box::new(worst_fd_ratio.clone()))?;
        registry.register(Box::new(num_threads.clone()))?;
        registry.register(Box::new(oldest_start_time_seconds.clone()))?;

        registry.register(Box::new(scrape_errors_total.clone()))?;
        registry.register(Box::new(read_errors_total.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(cycle_success.clone()))?;
        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(tracked_processes.clone()))?;

        // Every kind shows up at zero before the first failure.
        for kind in ReadErrorKind::ALL {
            read_errors_total.with_label_values(&[kind.as_str()]);
        }

        Ok(Self {
            num_procs,
            cpu_seconds_total,
            read_bytes_total,
            write_bytes_total,
            major_page_faults_total,
            minor_page_faults_total,
            memory_bytes,
            open_filedesc,
            worst_fd_ratio,
            num_threads,
            oldest_start_time_seconds,
            scrape_errors_total,
            read_errors_total,
            cycle_duration_seconds,
            cycle_success,
            scrape_duration_seconds,
            tracked_processes,
        })
    }

    /// Resets group gauges so groups that vanished from the snapshot stop
    /// being exported. Counters are set absolutely in `set_groups`.
    pub fn reset_group_metrics(&self) {
        self.num_procs.reset();
        self.memory_bytes.reset();
        self.open_filedesc.reset();
        self.worst_fd_ratio.reset();
        self.num_threads.reset();
        self.oldest_start_time_seconds.reset();
    }

    /// Publishes one snapshot of group metrics.
    pub fn set_groups(&self, groups: &GroupByName) {
        self.reset_group_metrics();

        for (name, group) in groups {
            let labels = [name.as_ref()];

            self.num_procs
                .with_label_values(&labels)
                .set(group.procs as f64);

            // For counters reporting cumulative group values, use reset + inc_by pattern
            let counters = [
                (&self.cpu_seconds_total, group.counts.cpu_seconds),
                (&self.read_bytes_total, group.counts.read_bytes as f64),
                (&self.write_bytes_total, group.counts.write_bytes as f64),
                (
                    &self.major_page_faults_total,
                    group.counts.major_page_faults as f64,
                ),
                (
                    &self.minor_page_faults_total,
                    group.counts.minor_page_faults as f64,
                ),
            ];
            for (vec, value) in counters {
                let counter = vec.with_label_values(&labels);
                counter.reset();
                counter.inc_by(value);
            }

            self.memory_bytes
                .with_label_values(&[name.as_ref(), "resident"])
                .set(group.memory.resident_bytes as f64);
            self.memory_bytes
                .with_label_values(&[name.as_ref(), "virtual"])
                .set(group.memory.virtual_bytes as f64);
            self.open_filedesc
                .with_label_values(&labels)
                .set(group.open_fds as f64);
            self.worst_fd_ratio
                .with_label_values(&labels)
                .set(group.worst_fd_ratio);
            self.num_threads
                .with_label_values(&labels)
                .set(group.num_threads as f64);
            if let Some(start) = group.oldest_start_time {
                self.oldest_start_time_seconds
                    .with_label_values(&labels)
                    .set(start);
            }
        }
    }

    pub fn record_read_errors(&self, errors: &CollectErrors) {
        for kind in ReadErrorKind::ALL {
            let n = errors.count(kind);
            if n > 0 {
                self.read_errors_total
                    .with_label_values(&[kind.as_str()])
                    .inc_by(n as f64);
            }
        }
    }
}
