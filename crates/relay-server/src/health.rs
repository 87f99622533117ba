//! `/health` endpoint.

use chrono::Utc;
use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is answering.
    pub status: String,
    /// Backend reachability: `"connected"` or `"disconnected"`.
    pub ollama: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// When the probe ran (RFC 3339).
    pub timestamp: String,
}

/// Build a health response from live counters and a probe result.
pub fn health_check(start_time: Instant, backend_reachable: bool, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        ollama: if backend_reachable {
            "connected".into()
        } else {
            "disconnected".into()
        },
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        timestamp: Utc::now().to_rfc3339(),
    }
}
