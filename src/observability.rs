use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "calclash_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "calclash_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "calclash_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "calclash_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "calclash_connections_rejected_total";

/// Gauge: number of calendars with a live registry.
pub const CALENDARS_ACTIVE: &str = "calclash_calendars_active";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: candidates stored after a clean check.
pub const EVENTS_ACCEPTED_TOTAL: &str = "calclash_events_accepted_total";

/// Counter: candidates or updates rejected for overlapping a shared participant.
pub const CONFLICTS_TOTAL: &str = "calclash_conflicts_total";

/// Gauge: events held across all calendars.
pub const EVENTS_STORED: &str = "calclash_events_stored";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
///
/// A failed install is logged and the server keeps running without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertEvent(_) => "insert_event",
        Command::UpdateEvent { .. } => "update_event",
        Command::DeleteEvent { .. } => "delete_event",
        Command::SelectEvents { .. } => "select_events",
        Command::SelectSuggestions(_) => "select_suggestions",
    }
}
