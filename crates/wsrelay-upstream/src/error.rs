//! Upstream session errors and outcomes.

use thiserror::Error;

/// Dial or I/O failure on the upstream session. Fatal to the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The opening handshake failed or timed out.
    #[error("failed to connect to {endpoint}: {reason}")]
    Dial {
        /// The endpoint that was dialed.
        endpoint: String,
        /// Why the dial failed.
        reason: String,
    },
    /// Reading from or writing to the socket failed.
    #[error("upstream I/O error: {0}")]
    Io(String),
    /// A keepalive ping could not be written.
    #[error("keepalive failed: {0}")]
    Keepalive(String),
    /// The socket ended without a close handshake.
    #[error("upstream connection closed unexpectedly")]
    Closed,
}

/// How a session ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested and the close handshake was attempted.
    Shutdown,
    /// The peer sent a close frame.
    PeerClosed,
}
