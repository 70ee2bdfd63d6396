//! Server configuration.

use std::time::Duration;

use linkpush_settings::LinkpushSettings;
use serde::{Deserialize, Serialize};

use crate::delivery::RetryPolicy;

/// Configuration for the linkpush server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Base of every shortened URL. `None` derives it from `port`.
    pub public_base_url: Option<String>,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client whose last pong is older than this.
    pub heartbeat_timeout_secs: u64,
    /// Retries after the first failed write.
    pub max_retries: u32,
    /// Delay between write attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Idle time before a disconnected session is evicted; `0` disables.
    pub session_ttl_secs: u64,
    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
    /// Characters per generated shortcode.
    pub code_length: usize,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &LinkpushSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            public_base_url: settings
                .server
                .public_base_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string()),
            send_queue_capacity: settings.server.send_queue_capacity,
            heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
            max_retries: settings.delivery.max_retries,
            retry_delay_ms: settings.delivery.retry_delay_ms,
            session_ttl_secs: settings.sessions.ttl_secs,
            sweep_interval_secs: settings.sessions.sweep_interval_secs,
            code_length: settings.shortcodes.code_length,
        }
    }

    /// Retry policy for the delivery engine.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Session TTL, or `None` when eviction is disabled.
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }

    /// Base for shortened URLs: the configured one, else
    /// `http://localhost:<port>`.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.clone(),
            None => format!("http://localhost:{}", self.port),
        }
    }

    /// Externally visible URL for `code`.
    pub fn shortened_url(&self, code: &str) -> String {
        format!("{}/{code}", self.base_url())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            public_base_url: None,
            send_queue_capacity: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_retries: 3,
            retry_delay_ms: 1000,
            session_ttl_secs: 86_400,
            sweep_interval_secs: 300,
            code_length: 8,
        }
    }
}
