//! The outbound notification channel seam.

use std::sync::Arc;

use crate::errors::DeliveryError;
use crate::ids::ConnectionId;

/// A live outbound connection a session can be bound to.
///
/// `send` must not block: implementations enqueue the frame for the
/// connection's writer and fail fast when the writer is gone or saturated.
pub trait NotificationChannel: Send + Sync {
    /// Identity of the underlying connection.
    fn connection_id(&self) -> &ConnectionId;

    /// Write one encoded frame.
    fn send(&self, frame: Arc<String>) -> Result<(), DeliveryError>;
}
