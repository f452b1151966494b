//! Sampling cycle logic for the exporter.
//!
//! A background task runs one cycle per interval. Each cycle scans the process
//! source on a blocking thread, feeds the scan to the grouper and publishes the
//! resulting group snapshot to the cache. A failed cycle leaves the previous
//! snapshot in place.

use anyhow::anyhow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use herakles_process_exporter::process::{
    load_observations, Classifier, GroupUpdate, Grouper, ProcFs, ReadErrorKind, ScanError,
    StaticIter,
};
use herakles_process_exporter::CycleReport;

use crate::config::{Config, DEFAULT_UPDATE_INTERVAL};
use crate::state::SharedState;

/// Where observations come from.
#[derive(Debug, Clone)]
pub enum ProcSource {
    Procfs(ProcFs),
    /// A JSON array of recorded observations, re-read every cycle.
    TestData(PathBuf),
}

impl ProcSource {
    pub fn from_config(config: &Config) -> Self {
        match &config.test_data_file {
            Some(path) => ProcSource::TestData(path.clone()),
            None => ProcSource::Procfs(ProcFs::new(config.procfs_root())),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ProcSource::Procfs(fs) => format!("procfs at {}", fs.root().display()),
            ProcSource::TestData(path) => format!("test data from {}", path.display()),
        }
    }

    /// Scans the source once and runs one grouper cycle over it.
    pub fn run<C: Classifier>(&self, grouper: &mut Grouper<C>) -> Result<GroupUpdate, ScanError> {
        match self {
            ProcSource::Procfs(fs) => grouper.update(fs.all_procs()),
            ProcSource::TestData(path) => {
                let observations = load_observations(path)?;
                debug!("Loaded {} test processes", observations.len());
                grouper.update(StaticIter::new(observations))
            }
        }
    }
}

/// Runs one sampling cycle and publishes its snapshot.
#[instrument(skip(state))]
pub async fn run_cycle(state: &SharedState) -> anyhow::Result<()> {
    let start = Instant::now();

    let blocking_state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<(GroupUpdate, usize)> {
        let mut grouper = blocking_state
            .grouper
            .lock()
            .map_err(|_| anyhow!("grouper lock poisoned"))?;
        let update = blocking_state.source.run(&mut *grouper)?;
        Ok((update, grouper.tracker().len()))
    })
    .await?;

    let elapsed = start.elapsed().as_secs_f64();
    state.metrics.cycle_duration_seconds.set(elapsed);

    let (update, tracked) = match result {
        Ok(v) => v,
        Err(e) => {
            state.metrics.scrape_errors_total.inc();
            state.metrics.cycle_success.set(0.0);
            state.health_stats.record_cycle_failure();
            let mut cache = state.cache.write().await;
            cache.update_success = false;
            cache.update_duration_seconds = elapsed;
            return Err(e);
        }
    };

    if !update.errors.is_empty() {
        debug!(
            "{} processes could not be read ({} vanished during the scan)",
            update.errors.len(),
            update.errors.count(ReadErrorKind::Vanished)
        );
    }
    state.metrics.record_read_errors(&update.errors);
    state.health_stats.record_read_errors(&update.errors);
    state.health_stats.record_cycle(&CycleReport {
        duration_seconds: elapsed,
        tracked_processes: tracked as u64,
        new_processes: update.new_procs.len() as u64,
        groups: update.groups.len() as u64,
    });
    state.metrics.cycle_success.set(1.0);
    state.metrics.tracked_processes.set(tracked as f64);

    let group_count = update.groups.len();
    {
        let mut cache = state.cache.write().await;
        cache.groups = update.groups;
        cache.tracked_processes = tracked;
        cache.cycles += 1;
        cache.last_updated = Some(Instant::now());
        cache.update_duration_seconds = elapsed;
        cache.update_success = true;
    }

    info!(
        "Cycle completed: {} groups, {} tracked, {} new, {} read errors, {:.2}ms",
        group_count,
        tracked,
        update.new_procs.len(),
        update.errors.len(),
        elapsed * 1000.0
    );

    Ok(())
}

/// Runs cycles forever at the configured interval. The caller is expected to
/// have run the first cycle already.
pub async fn run_cycle_loop(state: SharedState) {
    let secs = state
        .config
        .update_interval_secs
        .unwrap_or(DEFAULT_UPDATE_INTERVAL)
        .max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick completes immediately.
    ticker.tick().await;
    info!("Sampling every {}s from {}", secs, state.source.describe());

    loop {
        ticker.tick().await;
        if let Err(e) = run_cycle(&state).await {
            warn!("Sampling cycle failed, keeping last snapshot: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_process_exporter::process::ProcStatic;
    use tempfile::tempdir;

    fn everything(info: &ProcStatic) -> Option<Arc<str>> {
        Some(Arc::from(info.name.as_str()))
    }

    #[test]
    fn test_test_data_source_feeds_grouper() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("procs.json");
        std::fs::write(
            &path,
            r#"[
                {"id": {"pid": 1, "start_time": 10}, "name": "init",
                 "metrics": {"cpu_seconds": 1.5, "read_bytes": null, "write_bytes": 4}},
                {"id": {"pid": 2, "start_time": 20}, "name": "init",
                 "metrics": {"cpu_seconds": 0.5}}
            ]"#,
        )
        .expect("Failed to write test data");

        let source = ProcSource::TestData(path);
        let mut grouper = Grouper::new(everything, false);
        let update = source.run(&mut grouper).expect("cycle failed");
        assert_eq!(update.groups["init"].procs, 2);
        assert_eq!(update.new_procs.len(), 2);
    }

    #[test]
    fn test_missing_test_data_fails_cycle() {
        let dir = tempdir().expect("Failed to create temp dir");
        let source = ProcSource::TestData(dir.path().join("missing.json"));
        let mut grouper = Grouper::new(everything, false);
        assert!(source.run(&mut grouper).is_err());
    }
}
