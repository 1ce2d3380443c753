//! Why settings could not be loaded or used.

use std::path::PathBuf;

use thiserror::Error;

/// A settings layer that cannot be read, or a value the relay cannot run with.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON matching the settings schema.
    #[error("{} is not valid settings JSON: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A field holds a value the relay rejects.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted settings key, e.g. `upstream.endpoint`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { field, .. } => Some(*field),
            Self::Read { .. } | Self::Parse { .. } => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
