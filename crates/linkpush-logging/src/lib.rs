//! # linkpush-logging
//!
//! Structured logging with `tracing`.
//!
//! Session and connection identifiers travel as span and event fields
//! rather than being threaded through log calls by hand.

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // set_global_default is a no-op if already set
    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.compact().try_init(),
    };
}
