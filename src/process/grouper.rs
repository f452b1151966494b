//! Aggregation of tracked processes into named groups.
//!
//! All tracked processes sharing a group name are summed into one [`Group`].
//! Cumulative counts must never go backwards even as members exit, so each
//! group keeps a retained floor: the final counts of every member that has
//! left. A group's reported counts are its floor plus the accumulators of the
//! members that are still alive. Live members are never added to the floor,
//! so their growth is counted exactly once.

use ahash::AHashMap as HashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::classifier::Classifier;
use super::model::{Counts, Memory, ProcId, ProcInfo, ProcessObservation};
use super::source::{CollectErrors, ProcIter, ScanError};
use super::tracker::{Tracker, TrackerUpdate};

/// Metrics of a single group for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Group {
    #[serde(flatten)]
    pub counts: Counts,
    pub procs: u64,
    pub memory: Memory,
    /// Earliest start time (unix seconds) among live members.
    pub oldest_start_time: Option<f64>,
    pub open_fds: u64,
    pub worst_fd_ratio: f64,
    pub num_threads: u64,
}

impl Group {
    fn add_member(&mut self, info: &ProcInfo, counts: Counts) {
        let m = &info.metrics;
        self.procs += 1;
        self.memory.resident_bytes += m.memory.resident_bytes;
        self.memory.virtual_bytes += m.memory.virtual_bytes;
        if let Some(open) = m.filedesc.open {
            self.open_fds += open;
        }
        if let Some(ratio) = m.filedesc.ratio() {
            if ratio > self.worst_fd_ratio {
                self.worst_fd_ratio = ratio;
            }
        }
        self.num_threads += m.num_threads;
        self.counts += counts;

        let start = info.static_info.start_time_seconds;
        match self.oldest_start_time {
            Some(oldest) if oldest <= start => {}
            _ => self.oldest_start_time = Some(start),
        }
    }
}

/// Group name to group metrics.
pub type GroupByName = BTreeMap<Arc<str>, Group>;

/// Result of one grouper cycle.
#[derive(Debug, Default)]
pub struct GroupUpdate {
    pub groups: GroupByName,
    /// Processes discovered this cycle, before classification.
    pub new_procs: Vec<ProcessObservation>,
    pub errors: CollectErrors,
}

/// Top-level entry point: classifies processes and aggregates them by group.
pub struct Grouper<C> {
    tracker: Tracker,
    classifier: C,
    track_children: bool,
    /// Retained floor per group name. Entries are never removed.
    group_accum: HashMap<Arc<str>, Counts>,
    /// Live members at the end of the previous cycle and their counts then.
    members: HashMap<ProcId, (Arc<str>, Counts)>,
}

impl<C: Classifier> Grouper<C> {
    /// With `track_children`, processes whose parent is tracked join the
    /// parent's group regardless of the classifier.
    pub fn new(classifier: C, track_children: bool) -> Self {
        Self {
            tracker: Tracker::new(),
            classifier,
            track_children,
            group_accum: HashMap::new(),
            members: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Runs one cycle: updates the tracker, classifies new processes and
    /// returns the per-group metrics. On a scan error neither the tracker nor
    /// any group state changes.
    #[instrument(skip_all)]
    pub fn update<I: ProcIter>(&mut self, procs: I) -> Result<GroupUpdate, ScanError> {
        let TrackerUpdate {
            mut new_procs,
            errors,
        } = self.tracker.update(procs)?;

        // Oldest first, so parents are tracked before their children.
        new_procs.sort_by_key(|p| (p.id.start_time, p.id.pid));
        for obs in &new_procs {
            let outcome = match self.group_for(obs) {
                Some(group) => self.tracker.track(group, obs.clone()),
                None => self.tracker.ignore(obs.id),
            };
            if let Err(e) = outcome {
                debug!("Could not classify {}: {}", obs.id, e);
            }
        }

        let mut groups = GroupByName::new();
        let mut live = HashMap::with_capacity(self.members.len());
        for (id, tp) in self.tracker.tracked() {
            let counts = tp.counts();
            groups
                .entry(Arc::clone(tp.group_name()))
                .or_default()
                .add_member(tp.info(), counts);
            live.insert(*id, (Arc::clone(tp.group_name()), counts));
        }

        // A departed member leaves behind its counts from the last complete scan.
        for (id, (group, counts)) in self.members.drain() {
            if !live.contains_key(&id) {
                debug!("Process {} left group {}", id, group);
                *self.group_accum.entry(group).or_default() += counts;
            }
        }
        self.members = live;

        for (name, group) in groups.iter_mut() {
            let floor = self.group_accum.entry(Arc::clone(name)).or_default();
            group.counts += *floor;
        }
        for (name, floor) in &self.group_accum {
            groups.entry(Arc::clone(name)).or_insert_with(|| Group {
                counts: *floor,
                ..Default::default()
            });
        }

        Ok(GroupUpdate {
            groups,
            new_procs,
            errors,
        })
    }

    fn group_for(&self, obs: &ProcessObservation) -> Option<Arc<str>> {
        if self.track_children {
            let ppid = obs.static_info.parent_pid;
            if ppid != 0 && ppid != obs.id.pid {
                if let Some(group) = self.tracker.group_of_pid(ppid) {
                    return Some(Arc::clone(group));
                }
            }
        }
        self.classifier.classify(&obs.static_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::model::{Filedesc, ProcMetrics, ProcStatic};
    use crate::process::source::StaticIter;

    fn obs(pid: u32, ppid: u32, name: &str, fds: Option<u64>) -> ProcessObservation {
        ProcessObservation::new(
            ProcId::new(pid, pid as u64),
            ProcStatic {
                name: name.to_string(),
                parent_pid: ppid,
                start_time_seconds: 1_000.0 + pid as f64,
                ..Default::default()
            },
            ProcMetrics {
                memory: Memory {
                    resident_bytes: 100,
                    virtual_bytes: 1000,
                },
                filedesc: Filedesc {
                    open: fds,
                    limit: 100,
                },
                num_threads: 2,
                ..Default::default()
            },
        )
    }

    fn by_name(info: &ProcStatic) -> Option<Arc<str>> {
        match info.name.as_str() {
            "web" => Some(Arc::from("web")),
            _ => None,
        }
    }

    #[test]
    fn test_group_snapshot_fields() {
        let mut g = Grouper::new(by_name, false);
        let update = g
            .update(StaticIter::new(vec![
                obs(10, 1, "web", Some(20)),
                obs(11, 1, "web", None),
                obs(12, 1, "other", Some(99)),
            ]))
            .unwrap();

        let web = &update.groups["web"];
        assert_eq!(web.procs, 2);
        assert_eq!(web.memory.resident_bytes, 200);
        assert_eq!(web.memory.virtual_bytes, 2000);
        // The unreadable fd count contributes zero.
        assert_eq!(web.open_fds, 20);
        assert_eq!(web.worst_fd_ratio, 0.2);
        assert_eq!(web.num_threads, 4);
        assert_eq!(web.oldest_start_time, Some(1010.0));
        assert_eq!(update.groups.len(), 1);
        assert_eq!(update.new_procs.len(), 3);
    }

    #[test]
    fn test_children_follow_parent_group() {
        let mut g = Grouper::new(by_name, true);
        let update = g
            .update(StaticIter::new(vec![
                obs(21, 20, "worker", None),
                obs(20, 1, "web", None),
                obs(30, 1, "worker", None),
            ]))
            .unwrap();
        assert_eq!(update.groups["web"].procs, 2);
        assert!(g.tracker().is_ignored(&ProcId::new(30, 30)));
    }

    #[test]
    fn test_children_ignored_without_track_children() {
        let mut g = Grouper::new(by_name, false);
        let update = g
            .update(StaticIter::new(vec![
                obs(20, 1, "web", None),
                obs(21, 20, "worker", None),
            ]))
            .unwrap();
        assert_eq!(update.groups["web"].procs, 1);
        assert!(g.tracker().is_ignored(&ProcId::new(21, 21)));
    }
}
