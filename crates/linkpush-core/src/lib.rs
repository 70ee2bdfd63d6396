//! # linkpush-core
//!
//! Shared vocabulary for the linkpush crates:
//!
//! - **Branded IDs**: [`SessionId`] and [`ConnectionId`] newtypes
//! - **Wire types**: [`Notification`] (server → client) and [`ClientMessage`]
//!   (client → server) with their exact JSON framing
//! - **Errors**: [`LinkError`] for request-path failures, [`DeliveryError`]
//!   for push-path failures
//! - **Channel seam**: the [`NotificationChannel`] trait the session registry
//!   stores and the delivery engine writes to
//! - **URL validation**: [`validate_url`]

#![deny(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod ids;
pub mod notification;
pub mod url;

pub use channel::NotificationChannel;
pub use errors::{DeliveryError, LinkError};
pub use ids::{ConnectionId, SessionId};
pub use notification::{ClientMessage, Notification, NotificationKind};
pub use url::{is_valid_url, validate_url};
