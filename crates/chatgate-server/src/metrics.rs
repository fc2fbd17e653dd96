//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Connections closed for exceeding the drop limit (counter).
pub const WS_SLOW_CLIENT_DISCONNECTS_TOTAL: &str = "ws_slow_client_disconnects_total";
/// Operations dispatched (counter, labels: family, op).
pub const GATEWAY_OPERATIONS_TOTAL: &str = "gateway_operations_total";
/// Operations that did not succeed (counter, labels: family, op, status).
pub const GATEWAY_OPERATION_ERRORS_TOTAL: &str = "gateway_operation_errors_total";
/// Operation latency (histogram, labels: family, op).
pub const GATEWAY_OPERATION_DURATION_SECONDS: &str = "gateway_operation_duration_seconds";
/// Frames dropped in the discriminant pass (counter, labels: family).
pub const GATEWAY_DECODE_ERRORS_TOTAL: &str = "gateway_decode_errors_total";
/// Failed summary refreshes after a chat disconnect (counter).
pub const LIFECYCLE_SYNC_FAILURES_TOTAL: &str = "lifecycle_sync_failures_total";
