//! `POST /`: relay one caller request and wait for its reply.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};
use wsrelay_core::message::CallerRequest;
use wsrelay_core::{CorrelationId, CorrelationStore, PendingRequest};

use crate::error::IngressError;
use crate::metrics::{RELAY_ERRORS_TOTAL, RELAY_REQUEST_DURATION_SECONDS, RELAY_REQUESTS_TOTAL};
use crate::server::AppState;

/// Header consulted for the caller address behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Handler for `POST /`.
pub async fn relay(State(state): State<AppState>, request: Request) -> Response {
    let started = Instant::now();
    metrics::counter!(RELAY_REQUESTS_TOTAL).increment(1);

    let caller = caller_address(request.headers(), request.extensions().get());
    let result = match to_bytes(request.into_body(), state.config.max_body_bytes).await {
        Ok(body) => forward(&state, &caller, &body).await,
        Err(e) => Err(IngressError::Unreadable(e)),
    };

    metrics::histogram!(RELAY_REQUEST_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    match result {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => {
            metrics::counter!(RELAY_ERRORS_TOTAL, "kind" => e.kind()).increment(1);
            e.into_response()
        }
    }
}

/// Register, send, and race the reply against the deadline.
async fn forward(state: &AppState, caller: &str, body: &[u8]) -> Result<Value, IngressError> {
    let request = CallerRequest::parse(body).map_err(IngressError::Malformed)?;

    let cid = state.ids.generate(caller);
    let deadline = Instant::now() + state.config.request_timeout;
    let (record, mut reply) = PendingRequest::new(cid.clone(), request.id.clone());
    let _ = state.store.set(cid.clone(), record, deadline.into_std());
    let guard = PendingGuard::new(&state.store, &cid);

    debug!(correlation_id = %cid, original_id = %request.id, caller, "relaying request");
    state
        .outbound
        .send_text(request.to_upstream_frame(&cid))
        .await?;

    let outcome = tokio::select! {
        delivered = &mut reply => delivered.map_err(|_| IngressError::Dropped),
        () = sleep_until(deadline) => {
            if state.store.delete(cid.as_str()).is_some() {
                info!(correlation_id = %cid, original_id = %request.id, "upstream reply timed out");
                Err(IngressError::Timeout)
            } else {
                // The dispatcher claimed it first; its completion is already in flight.
                reply.await.map_err(|_| IngressError::Dropped)
            }
        }
    };
    guard.disarm();
    outcome
}

/// First `X-Forwarded-For` entry, else the peer address, else `"unknown"`.
fn caller_address(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.to_string()))
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Deletes the pending entry if the handler is dropped mid-wait.
struct PendingGuard {
    store: Arc<CorrelationStore>,
    id: Option<CorrelationId>,
}

impl PendingGuard {
    fn new(store: &Arc<CorrelationStore>, id: &CorrelationId) -> Self {
        Self {
            store: Arc::clone(store),
            id: Some(id.clone()),
        }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            if self.store.delete(id.as_str()).is_some() {
                debug!(correlation_id = %id, "released abandoned request");
            }
        }
    }
}
