//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Addressed-send drops total (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Broadcast drops total (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Busy rejections total (counter).
pub const SESSION_BUSY_REJECTIONS_TOTAL: &str = "session_busy_rejections_total";
/// Duplicate discards total (counter).
pub const SESSION_DUPLICATES_TOTAL: &str = "session_duplicates_total";
/// Backend requests total (counter, labels: backend).
pub const BACKEND_REQUESTS_TOTAL: &str = "backend_requests_total";
/// Primary-to-fallback escalations total (counter, labels: reason).
pub const BACKEND_FAILOVERS_TOTAL: &str = "backend_failovers_total";
/// Both-backends-failed total (counter).
pub const BACKEND_EXHAUSTED_TOTAL: &str = "backend_exhausted_total";
/// Chat responses delivered total (counter, labels: backend).
pub const CHAT_RESPONSES_TOTAL: &str = "chat_responses_total";
/// Inference duration seconds (histogram, labels: backend).
pub const INFERENCE_DURATION_SECONDS: &str = "inference_duration_seconds";
