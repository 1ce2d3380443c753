//! Server configuration.

use std::time::Duration;

use wsrelay_settings::RelaySettings;

use crate::shutdown::DRAIN_SLACK;

/// Configuration for the caller-facing HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// How long a caller waits for its upstream reply.
    pub request_timeout: Duration,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
    /// Maximum number of requests awaiting a reply.
    pub store_capacity: usize,
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            request_timeout: settings.request_timeout(),
            max_body_bytes: settings.server.max_body_bytes,
            store_capacity: settings.relay.store_capacity,
        }
    }

    /// Upper bound on draining in-flight callers at shutdown.
    pub fn drain_timeout(&self) -> Duration {
        self.request_timeout + DRAIN_SLACK
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            request_timeout: Duration::from_secs(3),
            max_body_bytes: 2 * 1024 * 1024, // 2 MB
            store_capacity: 100,
        }
    }
}
