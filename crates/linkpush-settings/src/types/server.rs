//! Server, delivery, session, shortcode, and logging sections.

use serde::{Deserialize, Serialize};

/// Network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Base of every shortened URL handed to clients. Unset means
    /// `http://localhost:<port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is dropped.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_base_url: None,
            send_queue_capacity: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

impl ServerSettings {
    /// Base for shortened URLs, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.port),
        }
    }
}

/// Push retry policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Retries after the first failed write.
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Idle time after which a disconnected session is evicted. `0` disables eviction.
    pub ttl_secs: u64,
    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            sweep_interval_secs: 300,
        }
    }
}

/// Shortcode generation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortcodeSettings {
    /// Characters per generated code.
    pub code_length: usize,
}

impl Default for ShortcodeSettings {
    fn default() -> Self {
        Self { code_length: 8 }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
