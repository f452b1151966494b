//! Cache of the latest group snapshot.
//!
//! This module provides the `GroupCache` structure the sampling task writes
//! after every cycle and the HTTP handlers read from.

use herakles_process_exporter::process::GroupByName;
use std::time::Instant;

/// Last successful group snapshot with update timing information.
#[derive(Clone, Default)]
pub struct GroupCache {
    pub groups: GroupByName,
    pub tracked_processes: usize,
    pub cycles: u64,
    pub last_updated: Option<Instant>,
    pub update_duration_seconds: f64,
    /// Whether the most recent cycle succeeded. `groups` is left as it was
    /// when a cycle fails.
    pub update_success: bool,
}
