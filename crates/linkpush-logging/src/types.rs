//! Logging types shared across the crate.

use serde::{Deserialize, Serialize};

/// Minimum level used when `RUST_LOG` is unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed entry/exit points.
    Trace,
    /// Intermediate values, decisions.
    Debug,
    /// Outcomes, summaries.
    Info,
    /// Non-fatal issues such as a failed delivery attempt.
    Warn,
    /// Errors.
    Error,
}

impl LogLevel {
    /// Convert from string (case-insensitive). Unknown values map to `Info`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Filter directive understood by `EnvFilter`.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_directive())
    }
}

/// Output format for the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Convert from string (case-insensitive). Unknown values map to `Pretty`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn log_level_from_str_lossy() {
        assert_eq!(LogLevel::from_str_lossy("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_lossy("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_lossy(" debug "), LogLevel::Debug);
        assert_eq!(LogLevel::from_str_lossy("unknown"), LogLevel::Info);
    }

    #[test]
    fn log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn log_level_serde() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let back: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, LogLevel::Error);
    }

    #[test]
    fn log_format_from_str_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
