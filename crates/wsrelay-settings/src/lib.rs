//! # wsrelay-settings
//!
//! Layered configuration for the relay.
//!
//! Settings are loaded from these layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **User file**: `~/.wsrelay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WSRELAY_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    LoadedSettings, RejectedOverride, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
