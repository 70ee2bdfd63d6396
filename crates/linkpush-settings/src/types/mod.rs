//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files are accepted; missing fields keep their default value.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8080, "publicBaseUrl": "https://sho.rt" },
///   "delivery": { "maxRetries": 5 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkpushSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Push retry policy.
    pub delivery: DeliverySettings,
    /// Session lifecycle settings.
    pub sessions: SessionSettings,
    /// Shortcode generation settings.
    pub shortcodes: ShortcodeSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}
