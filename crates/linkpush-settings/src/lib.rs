//! # linkpush-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LinkpushSettings::default()`]
//! 2. **User file**: `~/.linkpush/settings.json`, or the file named by
//!    `LINKPUSH_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `LINKPUSH_*` overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
