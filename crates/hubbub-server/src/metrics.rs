//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the process-global recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed; callers may carry on without metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric names, shared by the hub, sessions and the HTTP layer.

/// Registered sessions (gauge).
pub const HUB_SESSIONS_ACTIVE: &str = "hub_sessions_active";
/// Broadcast requests processed (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Messages queued on session mailboxes (counter).
pub const HUB_DELIVERIES_TOTAL: &str = "hub_deliveries_total";
/// Sessions evicted for a full mailbox (counter).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// WebSocket sessions started (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions ended (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Handshakes rejected before upgrade (counter).
pub const WS_UPGRADE_FAILURES_TOTAL: &str = "ws_upgrade_failures_total";
/// Session lifetime in seconds (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ws_session_duration_seconds";
