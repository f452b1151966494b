//! Herakles Process Exporter Library
//!
//! This library tracks individual processes across repeated scans of a process
//! table and aggregates them into named groups. Cumulative counters (CPU time,
//! I/O bytes, page faults) are accumulated as per-process growth, so a group's
//! totals never go backwards when member processes exit or pids are reused.
//!
//! # Features
//!
//! - **Identity tracking**: Processes are keyed by pid plus start time
//! - **Churn-safe groups**: Departed members leave their counts behind as a floor
//! - **Sentinel-aware deltas**: Unreadable counters contribute zero, never garbage
//! - **Pluggable sources**: Scan a live procfs tree or a recorded JSON file
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_process_exporter::process::{GroupMatcher, Grouper, ProcFs};
//!
//! let matcher = GroupMatcher::load(None).expect("valid group rules");
//! let mut grouper = Grouper::new(matcher, true);
//! let fs = ProcFs::new("/proc");
//!
//! let update = grouper.update(fs.all_procs()).expect("complete scan");
//! for (name, group) in &update.groups {
//!     println!("{}: {} procs, {:.2}s cpu", name, group.procs, group.counts.cpu_seconds);
//! }
//! ```

pub mod health_stats;
pub mod process;

// Re-export main types for convenience
pub use health_stats::{CycleReport, HealthStats};
pub use process::{Group, GroupMatcher, Grouper, ProcFs, Tracker};
