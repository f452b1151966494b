//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the background sampling task.

use herakles_process_exporter::process::{GroupMatcher, Grouper};
use herakles_process_exporter::HealthStats;
use prometheus::Registry;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::RwLock;

use crate::cache::GroupCache;
use crate::config::Config;
use crate::cycle_runner::ProcSource;
use crate::metrics::GroupMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and background tasks.
pub struct AppState {
    pub registry: Registry,
    pub metrics: GroupMetrics,
    pub cache: RwLock<GroupCache>,
    /// Only the sampling task locks this, from a blocking thread.
    pub grouper: Mutex<Grouper<GroupMatcher>>,
    pub source: ProcSource,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
