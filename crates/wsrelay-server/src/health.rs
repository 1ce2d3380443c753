//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the upstream session is open, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Requests currently awaiting an upstream reply.
    pub pending_requests: usize,
    /// Maximum number of pending requests.
    pub store_capacity: usize,
    /// `"connected"` or `"closed"`.
    pub upstream: String,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    pending_requests: usize,
    store_capacity: usize,
    upstream_open: bool,
) -> HealthResponse {
    HealthResponse {
        status: if upstream_open { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        pending_requests,
        store_capacity,
        upstream: if upstream_open { "connected" } else { "closed" }.into(),
    }
}
