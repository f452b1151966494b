//! Process tracking and group aggregation.
//!
//! This module provides:
//! - `model`: Value types for one scan (identity, static facts, counters)
//! - `source`: The scan interface and per-process/scan error types
//! - `tracker`: Per-process identity tracking and counter accumulation
//! - `grouper`: Classification and per-group aggregation
//! - `classifier`: Rule-based group matching
//! - `procfs`: Scanning a procfs tree

pub mod classifier;
pub mod grouper;
pub mod model;
pub mod procfs;
pub mod source;
pub mod tracker;

// Re-export commonly used types
pub use classifier::{Classifier, ClassifierError, GroupMatcher, GroupRule, NameFilter};
pub use grouper::{Group, GroupByName, GroupUpdate, Grouper};
pub use model::{
    Counts, Filedesc, Memory, ProcId, ProcInfo, ProcMetrics, ProcStatic, ProcessObservation,
};
pub use procfs::{FsIter, ProcFs, CLK_TCK, PAGE_SIZE};
pub use source::{
    load_observations, CollectErrors, ProcIter, ProcReadError, ReadErrorKind, ScanError,
    StaticIter,
};
pub use tracker::{TrackError, TrackedProc, Tracker, TrackerUpdate};
