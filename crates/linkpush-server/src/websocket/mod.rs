//! WebSocket connection management, handshake, and client message dispatch.

pub mod connection;
pub mod session;
