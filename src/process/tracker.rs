//! Per-process identity tracking and counter accumulation.
//!
//! The tracker keeps one entry per process identity it has been told to
//! track, plus tombstones for identities it has been told to ignore. Each
//! cycle it diffs the scanned counters against the previous reading, adds the
//! growth into the entry's accumulator, reports identities it has never seen,
//! and drops entries whose process did not show up in the scan.
//!
//! Rather than building a fresh map every cycle, entries seen in the scan get
//! their cycle marker bumped; a second pass removes the ones left behind.
//! Nothing is applied until the scan has closed cleanly.
//! Tombstones carry no marker and are never swept, otherwise an ignored
//! process would come back as "new" on the next cycle.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use super::model::{Counts, ProcId, ProcInfo, ProcMetrics, ProcessObservation};
use super::source::{CollectErrors, ProcIter, ScanError};

/// Caller passed an identity the requested operation cannot apply to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    #[error("process {0} is ignored")]
    Ignored(ProcId),
    #[error("process {0} has not been observed")]
    Unknown(ProcId),
}

/// A process under tracking.
#[derive(Debug, Clone)]
pub struct TrackedProc {
    last_cycle: u64,
    info: ProcInfo,
    accum: Counts,
    group_name: Arc<str>,
}

impl TrackedProc {
    pub fn group_name(&self) -> &Arc<str> {
        &self.group_name
    }

    /// Static facts and the latest known-good counter readings.
    pub fn info(&self) -> &ProcInfo {
        &self.info
    }

    /// Growth accumulated since tracking began.
    pub fn counts(&self) -> Counts {
        self.accum
    }

    fn observe(&mut self, cycle: u64, current: ProcMetrics) {
        let last = &self.info.metrics;
        let delta = Counts {
            cpu_seconds: (current.cpu_seconds - last.cpu_seconds).max(0.0),
            read_bytes: counter_delta(last.read_bytes, current.read_bytes),
            write_bytes: counter_delta(last.write_bytes, current.write_bytes),
            major_page_faults: current
                .major_page_faults
                .saturating_sub(last.major_page_faults),
            minor_page_faults: current
                .minor_page_faults
                .saturating_sub(last.minor_page_faults),
        };
        self.accum += delta;

        // An unreadable counter keeps its last good value so the next
        // readable sample diffs against it.
        let read_bytes = current.read_bytes.or(last.read_bytes);
        let write_bytes = current.write_bytes.or(last.write_bytes);
        self.info.metrics = ProcMetrics {
            read_bytes,
            write_bytes,
            ..current
        };
        self.last_cycle = cycle;
    }
}

/// Growth of an optional cumulative counter. Zero unless both readings exist.
fn counter_delta(last: Option<u64>, current: Option<u64>) -> u64 {
    match (last, current) {
        (Some(last), Some(current)) => current.saturating_sub(last),
        _ => 0,
    }
}

/// Result of one tracker cycle.
#[derive(Debug, Default)]
pub struct TrackerUpdate {
    /// Processes seen for the first time, neither tracked nor ignored yet.
    pub new_procs: Vec<ProcessObservation>,
    pub errors: CollectErrors,
}

/// Tracks process identities across scans.
#[derive(Debug, Default)]
pub struct Tracker {
    /// `None` marks an ignored identity.
    tracked: HashMap<ProcId, Option<TrackedProc>>,
    /// Latest identity seen for each pid, used to detect pid reuse.
    proc_ids: HashMap<u32, ProcId>,
    /// Identities reported as new by the last update.
    pending: HashSet<ProcId>,
    cycle: u64,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `obs` under `group_name` with a zero accumulator.
    pub fn track(
        &mut self,
        group_name: Arc<str>,
        obs: ProcessObservation,
    ) -> Result<(), TrackError> {
        if let Some(None) = self.tracked.get(&obs.id) {
            return Err(TrackError::Ignored(obs.id));
        }
        let id = obs.id;
        self.claim_pid(id);
        self.pending.remove(&id);
        self.tracked.insert(
            id,
            Some(TrackedProc {
                last_cycle: self.cycle,
                info: obs.into_info(),
                accum: Counts::default(),
                group_name,
            }),
        );
        Ok(())
    }

    /// Excludes `id` from reporting until [`Tracker::unignore`] or its pid is
    /// reused.
    pub fn ignore(&mut self, id: ProcId) -> Result<(), TrackError> {
        if !self.pending.remove(&id) && !self.tracked.contains_key(&id) {
            return Err(TrackError::Unknown(id));
        }
        self.claim_pid(id);
        self.tracked.insert(id, None);
        Ok(())
    }

    /// Drops the tombstone for `id`; it is reported as new if seen again.
    pub fn unignore(&mut self, id: ProcId) -> Result<(), TrackError> {
        match self.tracked.get(&id) {
            Some(None) => {
                self.tracked.remove(&id);
                if self.proc_ids.get(&id.pid) == Some(&id) {
                    self.proc_ids.remove(&id.pid);
                }
                Ok(())
            }
            _ => Err(TrackError::Unknown(id)),
        }
    }

    /// Runs one cycle over `procs`.
    ///
    /// Per-process read failures are collected and skipped. Readings are
    /// staged until the scan closes; if `close` fails the error is returned
    /// and the tracker is left exactly as it was before the call.
    pub fn update<I: ProcIter>(&mut self, mut procs: I) -> Result<TrackerUpdate, ScanError> {
        let mut seen = Vec::new();
        let mut result = TrackerUpdate::default();
        while let Some(next) = procs.next_proc() {
            let obs = match next {
                Ok(obs) => obs,
                Err(e) => {
                    debug!("Skipping process: {}", e);
                    result.errors.record(e);
                    continue;
                }
            };

            match self.tracked.get(&obs.id) {
                Some(None) => {}
                Some(Some(_)) => seen.push((obs.id, obs.metrics)),
                None => result.new_procs.push(obs),
            }
        }
        procs.close()?;

        self.cycle += 1;
        let cycle = self.cycle;
        self.pending.clear();
        for (id, metrics) in seen {
            if let Some(Some(tp)) = self.tracked.get_mut(&id) {
                tp.observe(cycle, metrics);
            }
        }
        for obs in &result.new_procs {
            trace!("New process {} ({})", obs.id, obs.static_info.name);
            self.claim_pid(obs.id);
            self.pending.insert(obs.id);
        }

        let before = self.tracked.len();
        self.tracked.retain(|_, entry| match entry {
            Some(tp) => tp.last_cycle == cycle,
            None => true,
        });
        let tracked = &self.tracked;
        let pending = &self.pending;
        self.proc_ids
            .retain(|_, id| tracked.contains_key(id) || pending.contains(id));

        debug!(
            "Tracker cycle {}: {} new, {} exited, {} read errors",
            cycle,
            result.new_procs.len(),
            before - self.tracked.len(),
            result.errors.len()
        );
        Ok(result)
    }

    /// Records `id` as the current owner of its pid, evicting any other
    /// identity that held the pid before.
    fn claim_pid(&mut self, id: ProcId) {
        if let Some(old) = self.proc_ids.insert(id.pid, id) {
            if old != id && self.tracked.remove(&old).is_some() {
                debug!("Pid {} reused: evicting {} for {}", id.pid, old, id);
            }
        }
    }

    pub fn get(&self, id: &ProcId) -> Option<&TrackedProc> {
        self.tracked.get(id).and_then(Option::as_ref)
    }

    pub fn is_ignored(&self, id: &ProcId) -> bool {
        matches!(self.tracked.get(id), Some(None))
    }

    /// Live tracked processes, tombstones excluded.
    pub fn tracked(&self) -> impl Iterator<Item = (&ProcId, &TrackedProc)> {
        self.tracked
            .iter()
            .filter_map(|(id, entry)| entry.as_ref().map(|tp| (id, tp)))
    }

    /// Number of live tracked processes.
    pub fn len(&self) -> usize {
        self.tracked.values().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group of the tracked process currently holding `pid`.
    pub fn group_of_pid(&self, pid: u32) -> Option<&Arc<str>> {
        let id = self.proc_ids.get(&pid)?;
        self.get(id).map(TrackedProc::group_name)
    }
}
