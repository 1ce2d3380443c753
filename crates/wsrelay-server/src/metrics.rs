//! Prometheus metrics recorder and `/metrics` endpoint support.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::RelayError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, RelayError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| RelayError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Caller requests received (counter).
pub const RELAY_REQUESTS_TOTAL: &str = "relay_requests_total";
/// Caller requests that failed (counter, labels: kind).
pub const RELAY_ERRORS_TOTAL: &str = "relay_errors_total";
/// Caller request duration seconds (histogram).
pub const RELAY_REQUEST_DURATION_SECONDS: &str = "relay_request_duration_seconds";
/// Upstream frames processed by the dispatcher (counter, labels: outcome).
pub const UPSTREAM_FRAMES_TOTAL: &str = "upstream_frames_total";
/// Requests awaiting a reply (gauge).
pub const PENDING_REQUESTS: &str = "pending_requests";
