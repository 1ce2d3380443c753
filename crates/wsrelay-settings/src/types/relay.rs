//! Correlation and logging settings.

use serde::{Deserialize, Serialize};

/// Request correlation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorrelationSettings {
    /// How long a caller waits for its reply, in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum number of in-flight requests tracked at once.
    pub store_capacity: usize,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 3_000,
            store_capacity: 100,
        }
    }
}

/// Process logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
