//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/cansp-dev/herakles-process-exporter — More info: https://www.herakles.now — Support: exporter@herakles.now";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    // Track HTTP request for health endpoint
    state.health_stats.record_http_request();

    let cache = state.cache.read().await;

    // Serving the last good snapshot is still healthy; never having one is not.
    let status = if cache.last_updated.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let message = match (cache.last_updated.is_some(), cache.update_success) {
        (_, true) => "OK".to_string(),
        (true, false) => "DEGRADED - last cycle failed, serving previous snapshot".to_string(),
        (false, false) => "No successful sampling cycle yet".to_string(),
    };

    // Calculate uptime
    let uptime_seconds = state.health_stats.get_uptime_seconds();
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    let uptime_str = if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    };

    // Render plain-text table from HealthStats
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUptime: {uptime_str}\nCycles: {cycles} | Groups: {groups} | Tracked processes: {tracked} | Last cycle: {last_ms:.2}ms\n\n{table}\n{FOOTER_TEXT}",
            cycles = cache.cycles,
            last_ms = cache.update_duration_seconds * 1000.0,
            groups = cache.groups.len(),
            tracked = cache.tracked_processes,
        ),
    )
}
