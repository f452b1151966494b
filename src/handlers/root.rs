//! Root endpoint handler: a plain index of the exporter's endpoints.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    Html(render_index(
        state.start_time.elapsed().as_secs(),
        &state.source.describe(),
        state.config.enable_health.unwrap_or(true),
    ))
}

fn render_index(uptime_secs: u64, source: &str, health_enabled: bool) -> String {
    let mut links = vec![
        ("/metrics", "Prometheus metrics for every process group"),
        ("/groups", "Current group snapshot as JSON"),
    ];
    if health_enabled {
        links.push(("/health", "Exporter health and cycle statistics"));
    }
    let items: String = links
        .iter()
        .map(|(path, what)| format!("<li><a href=\"{0}\">{0}</a> {1}</li>\n", path, what))
        .collect();

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"><title>Herakles Process Exporter</title></head>\n\
         <body style=\"font-family: sans-serif\">\n<h1>Herakles Process Exporter</h1>\n\
         <table>\n<tr><td>Version</td><td>{}</td></tr>\n<tr><td>Uptime</td><td>{}h {}m {}s</td></tr>\n\
         <tr><td>Source</td><td>{}</td></tr>\n</table>\n<ul>\n{}</ul>\n<p><small>{}</small></p>\n</body></html>\n",
        env!("CARGO_PKG_VERSION"),
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60,
        escape(source),
        items,
        FOOTER_TEXT,
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
