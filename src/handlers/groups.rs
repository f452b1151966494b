//! Groups endpoint handler.
//!
//! This module provides the `/groups` endpoint handler that displays the
//! group snapshot of the last successful sampling cycle, as a text table or
//! as JSON (`?format=json`).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use herakles_process_exporter::process::GroupByName;

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct GroupsQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct GroupsResponse<'a> {
    cycles: u64,
    tracked_processes: usize,
    last_cycle_success: bool,
    groups: &'a GroupByName,
}

/// Handler for the /groups endpoint.
#[instrument(skip(state))]
pub async fn groups_handler(
    State(state): State<SharedState>,
    Query(query): Query<GroupsQuery>,
) -> Response {
    debug!("Processing /groups request");

    // Track HTTP request
    state.health_stats.record_http_request();

    let cache = state.cache.read().await;

    if query.format.as_deref() == Some("json") {
        return Json(GroupsResponse {
            cycles: cache.cycles,
            tracked_processes: cache.tracked_processes,
            last_cycle_success: cache.update_success,
            groups: &cache.groups,
        })
        .into_response();
    }

    let mut out = render_groups_table(&cache.groups);
    writeln!(out).ok();
    writeln!(
        out,
        "Cycles: {} | Tracked processes: {}",
        cache.cycles, cache.tracked_processes
    )
    .ok();
    writeln!(out, "{FOOTER_TEXT}").ok();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        out,
    )
        .into_response()
}

/// Renders groups as a plain-text table, one row per group.
pub fn render_groups_table(groups: &GroupByName) -> String {
    let mut out = String::new();

    writeln!(out, "HERAKLES PROCESS EXPORTER - GROUPS").ok();
    writeln!(out, "==================================").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "{:<24} {:>6} {:>12} {:>14} {:>14} {:>12} {:>8} {:>8}",
        "GROUP", "PROCS", "CPU (s)", "READ (B)", "WRITE (B)", "RSS (MB)", "FDS", "THREADS"
    )
    .ok();
    writeln!(out, "{}", "-".repeat(105)).ok();

    for (name, g) in groups {
        writeln!(
            out,
            "{:<24} {:>6} {:>12.2} {:>14} {:>14} {:>12.1} {:>8} {:>8}",
            name,
            g.procs,
            g.counts.cpu_seconds,
            g.counts.read_bytes,
            g.counts.write_bytes,
            g.memory.resident_bytes as f64 / 1024.0 / 1024.0,
            g.open_fds,
            g.num_threads
        )
        .ok();
    }

    out
}
