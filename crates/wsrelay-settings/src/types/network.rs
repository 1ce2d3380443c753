//! Listener and upstream connection settings.

use serde::{Deserialize, Serialize};

/// Caller-facing HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 2 * 1024 * 1024, // 2 MB
        }
    }
}

/// Upstream WebSocket session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// `ws://` or `wss://` URL of the upstream.
    pub endpoint: String,
    /// Keepalive ping interval in milliseconds.
    pub keepalive_interval_ms: u64,
    /// Grace period for the peer's close acknowledgment, in milliseconds.
    pub close_grace_ms: u64,
    /// Capacity of the outbound frame queue.
    pub outbound_queue: usize,
    /// Capacity of the inbound message queue.
    pub inbound_queue: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            keepalive_interval_ms: 2_000,
            close_grace_ms: 1_000,
            outbound_queue: 256,
            inbound_queue: 1024,
        }
    }
}
