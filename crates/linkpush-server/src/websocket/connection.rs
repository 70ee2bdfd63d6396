//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use linkpush_core::{ConnectionId, DeliveryError, NotificationChannel};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of frames rejected because the queue was full or closed.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Total frames rejected for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl NotificationChannel for ClientConnection {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    fn send(&self, frame: Arc<String>) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => DeliveryError::QueueFull,
                TrySendError::Closed(_) => DeliveryError::ChannelClosed,
            }
        })
    }
}
