//! Settings types.
//!
//! All structs use `#[serde(rename_all = "camelCase", default)]` so a
//! partial settings file only needs the keys it overrides.

mod network;
mod relay;

pub use network::{ServerSettings, UpstreamSettings};
pub use relay::{CorrelationSettings, LoggingSettings};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Caller-facing HTTP listener.
    pub server: ServerSettings,
    /// Upstream WebSocket session.
    pub upstream: UpstreamSettings,
    /// Request correlation.
    pub relay: CorrelationSettings,
    /// Process logging.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Per-request reply timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.relay.request_timeout_ms)
    }

    /// Interval between upstream keepalive pings.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.upstream.keepalive_interval_ms)
    }

    /// How long to wait for the peer's close acknowledgment on shutdown.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.upstream.close_grace_ms)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.upstream.endpoint.trim();
        if endpoint.is_empty() {
            return Err(SettingsError::invalid("upstream.endpoint", "is missing"));
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(SettingsError::invalid(
                "upstream.endpoint",
                format!("must be a ws:// or wss:// URL, got {endpoint}"),
            ));
        }
        let positive = [
            ("relay.requestTimeoutMs", self.relay.request_timeout_ms == 0),
            ("relay.storeCapacity", self.relay.store_capacity == 0),
            ("upstream.keepaliveIntervalMs", self.upstream.keepalive_interval_ms == 0),
            ("upstream.outboundQueue", self.upstream.outbound_queue == 0),
            ("upstream.inboundQueue", self.upstream.inbound_queue == 0),
        ];
        if let Some((field, _)) = positive.into_iter().find(|(_, zero)| *zero) {
            return Err(SettingsError::invalid(field, "must be positive"));
        }
        Ok(())
    }
}
