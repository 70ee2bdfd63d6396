//! # linkpush-server
//!
//! Axum HTTP + `WebSocket` server and push delivery.
//!
//! - HTTP endpoints: URL submission, shortcode redirect, health, metrics
//! - `WebSocket` gateway: session handshake, heartbeat, acknowledgements
//! - Delivery engine: at-least-once push with bounded retries and replay
//!   on reconnect
//! - Idle session eviction and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod delivery;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
