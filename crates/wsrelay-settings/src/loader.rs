//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `WSRELAY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// An environment override that was present but unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub key: &'static str,
    /// The value that failed to parse or was out of range.
    pub value: String,
}

/// Settings after every layer below the command line, plus any env
/// overrides that were ignored.
///
/// Loading usually runs before logging is configured, so rejected overrides
/// are carried here for [`LoadedSettings::log_rejected`] to report later.
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    /// The merged settings.
    pub settings: RelaySettings,
    /// Env overrides that were ignored.
    pub rejected: Vec<RejectedOverride>,
}

impl LoadedSettings {
    /// Warn once per ignored override.
    pub fn log_rejected(&self) {
        for r in &self.rejected {
            warn!(key = r.key, value = %r.value, "invalid env var, ignoring");
        }
    }
}

/// Resolve the path to the settings file (`~/.wsrelay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wsrelay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    let mut settings = load_file_layer(path)?;
    let rejected = apply_env_overrides(&mut settings);
    Ok(LoadedSettings { settings, rejected })
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(RelaySettings::default()).map_err(parse_err)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_err)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse_err)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WSRELAY_*` environment variable overrides.
///
/// Invalid values are ignored (falling back to file/default) and returned.
pub fn apply_env_overrides(settings: &mut RelaySettings) -> Vec<RejectedOverride> {
    apply_overrides(settings, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable source.
pub fn apply_overrides(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<RejectedOverride> {
    let env = EnvReader {
        lookup,
        rejected: RefCell::new(Vec::new()),
    };

    if let Some(v) = env.string("WSRELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16_range("WSRELAY_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("WSRELAY_ENDPOINT") {
        settings.upstream.endpoint = v;
    }
    if let Some(v) = env.u64_range("WSRELAY_TIMEOUT_MS", 1, 3_600_000) {
        settings.relay.request_timeout_ms = v;
    }
    if let Some(v) = env.usize_range("WSRELAY_STORE_CAPACITY", 1, 1_000_000) {
        settings.relay.store_capacity = v;
    }
    if let Some(v) = env.u64_range("WSRELAY_KEEPALIVE_MS", 100, 600_000) {
        settings.upstream.keepalive_interval_ms = v;
    }
    if let Some(v) = env.string("WSRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    env.rejected.into_inner()
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
    rejected: RefCell<Vec<RejectedOverride>>,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &'static str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(val.as_str());
        if result.is_none() {
            self.rejected.borrow_mut().push(RejectedOverride {
                key: name,
                value: val,
            });
        }
        result
    }

    fn u16_range(&self, name: &'static str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, |v| parse_u16_range(v, min, max))
    }

    fn u64_range(&self, name: &'static str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, |v| parse_u64_range(v, min, max))
    }

    fn usize_range(&self, name: &'static str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, |v| parse_usize_range(v, min, max))
    }
}
