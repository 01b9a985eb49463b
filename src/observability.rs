use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "vestry_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "vestry_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "vestry_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "vestry_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "vestry_connections_rejected_total";

/// Gauge: number of active sites (loaded engines).
pub const SITES_ACTIVE: &str = "vestry_sites_active";

/// Counter: failed login attempts.
pub const AUTH_FAILURES_TOTAL: &str = "vestry_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "vestry_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "vestry_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(request: &Request) -> &'static str {
    match request {
        Request::Auth { .. } => "auth",
        Request::Logout { .. } => "logout",
        Request::GetBookings { .. } => "get_bookings",
        Request::CheckConflicts { .. } => "check_conflicts",
        Request::CreateBooking { .. } => "create_booking",
        Request::TimeOptions { .. } => "time_options",
        Request::Subscribe { .. } => "subscribe",
        Request::CreateRoom { .. } => "create_room",
        Request::UpdateRoom { .. } => "update_room",
        Request::DeleteRoom { .. } => "delete_room",
        Request::ListRooms { .. } => "list_rooms",
        Request::ListBookings { .. } => "list_bookings",
        Request::DeleteBooking { .. } => "delete_booking",
        Request::Stats { .. } => "stats",
    }
}
