//! Caller-facing and runtime errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use wsrelay_core::{MalformedRequest, SendError};
use wsrelay_upstream::ConnectionError;

/// Why a caller did not get a relayed reply.
#[derive(Debug, Error)]
pub enum IngressError {
    /// The body could not be read or is not a relayable request.
    #[error("Invalid jsonrpc request")]
    Malformed(#[source] MalformedRequest),
    /// The body could not be read in full.
    #[error("Invalid jsonrpc request")]
    Unreadable(#[source] axum::Error),
    /// The frame could not be handed to the upstream.
    #[error("{0}")]
    UpstreamSend(#[from] SendError),
    /// No reply arrived before the deadline.
    #[error("upstream reply timed out")]
    Timeout,
    /// The pending request was dropped without a reply.
    #[error("upstream reply dropped")]
    Dropped,
}

impl IngressError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::Unreadable(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamSend(_) | Self::Timeout | Self::Dropped => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::Unreadable(_) => "malformed",
            Self::UpstreamSend(_) => "upstream_send",
            Self::Timeout => "timeout",
            Self::Dropped => "dropped",
        }
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Fatal relay runtime errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The upstream session could not be opened or failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The HTTP listener could not be bound.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    /// The HTTP server stopped with an error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
    /// The upstream session ended while the relay was running.
    #[error("upstream session ended")]
    SessionEnded,
    /// The metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    /// A relay task panicked or was cancelled.
    #[error("relay task failed: {0}")]
    Task(String),
}
