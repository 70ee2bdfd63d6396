//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions with a bound WebSocket connection.
    pub connections: usize,
    /// Session rows held by the registry.
    pub sessions: usize,
    /// Stored shortcodes.
    pub shortcodes: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    sessions: usize,
    shortcodes: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        shortcodes,
    }
}
