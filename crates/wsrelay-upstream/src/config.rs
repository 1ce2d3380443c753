//! Upstream session configuration.

use std::time::Duration;

/// Default interval between keepalive pings.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

/// Default wait for the peer's close acknowledgment.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Default dial timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one upstream session.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// `ws://` or `wss://` URL to dial.
    pub endpoint: String,
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// How long to wait for the peer's close frame after sending ours.
    pub close_grace: Duration,
    /// Upper bound on the opening handshake.
    pub connect_timeout: Duration,
    /// Capacity of the outbound frame queue.
    pub outbound_queue: usize,
    /// Capacity of the inbound message queue.
    pub inbound_queue: usize,
}

impl UpstreamConfig {
    /// Configuration for `endpoint` with default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            close_grace: DEFAULT_CLOSE_GRACE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            outbound_queue: 256,
            inbound_queue: 1024,
        }
    }
}
