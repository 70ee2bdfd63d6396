//! Session registry.
//!
//! Each row tracks the bound channel (if any) and the last notification
//! enqueued for the session. Rows are sharded in a [`DashMap`]; every
//! public method is one critical section on a single row, so the
//! read-check-write sequences of the delivery path never interleave.
//!
//! A pending notification moves through these states:
//!
//! ```text
//! enqueue ──► in flight ──finish(delivered)──► sent ──acknowledge──► cleared
//!                │  ▲                           │
//!   no channel / │  │ begin_replay              │ begin_replay
//!   exhausted    ▼  │                           ▼
//!               parked ◄──────────────────── in flight
//! ```
//!
//! Only one retry sequence may hold a notification in flight. A sequence
//! identifies its notification by generation; enqueueing a newer
//! notification supersedes any older sequence still running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use linkpush_core::{ConnectionId, Notification, NotificationChannel, SessionId};
use tracing::debug;

struct Pending {
    notification: Notification,
    frame: Arc<String>,
    generation: u64,
    in_flight: bool,
    sent: bool,
    rebound: bool,
}

struct SessionEntry {
    channel: Option<Arc<dyn NotificationChannel>>,
    pending: Option<Pending>,
    delivery_confirmed: bool,
    next_generation: u64,
    last_activity: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            channel: None,
            pending: None,
            delivery_confirmed: false,
            next_generation: 0,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Result of [`SessionRegistry::claim_attempt`].
pub enum Claim {
    /// Write `frame` to `channel`.
    Attempt {
        /// Channel bound at claim time.
        channel: Arc<dyn NotificationChannel>,
        /// Encoded notification.
        frame: Arc<String>,
    },
    /// No channel is bound. The notification is parked for replay.
    NoChannel,
    /// A newer notification replaced this one.
    Superseded,
    /// Nothing is pending any more (acknowledged or evicted).
    Cleared,
}

/// Owner of every session row.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume `presented` if it names a known session, else mint a new one.
    ///
    /// Returns the session id and whether it was resumed.
    pub fn get_or_create(&self, presented: Option<&str>) -> (SessionId, bool) {
        if let Some(id) = presented.filter(|s| !s.is_empty()) {
            let id = SessionId::from(id);
            if let Some(mut entry) = self.sessions.get_mut(&id) {
                entry.touch();
                return (id, true);
            }
        }
        loop {
            let id = SessionId::new();
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                let _ = slot.insert(SessionEntry::new());
                debug!(session_id = %id, "session created");
                return (id, false);
            }
        }
    }

    /// Bind `channel` to the session, replacing any previous channel.
    ///
    /// Creates the row if needed. Returns the replaced channel.
    pub fn bind_channel(
        &self,
        session_id: &SessionId,
        channel: Arc<dyn NotificationChannel>,
    ) -> Option<Arc<dyn NotificationChannel>> {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(SessionEntry::new);
        entry.touch();
        if let Some(pending) = entry.pending.as_mut().filter(|p| p.in_flight) {
            pending.rebound = true;
        }
        entry.channel.replace(channel)
    }

    /// Channel currently bound to the session.
    pub fn get_channel(&self, session_id: &SessionId) -> Option<Arc<dyn NotificationChannel>> {
        self.sessions
            .get(session_id)
            .and_then(|entry| entry.channel.clone())
    }

    /// Clear the channel if it still belongs to `connection_id`.
    ///
    /// The row and its pending notification are kept. Returns `false` when
    /// a newer connection has already been bound.
    pub fn unbind_channel(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let owned = entry
            .channel
            .as_ref()
            .is_some_and(|c| c.connection_id() == connection_id);
        if owned {
            entry.channel = None;
            entry.touch();
        }
        owned
    }

    /// Record `notification` as pending and start a retry sequence for it.
    ///
    /// Creates the row if needed so a later handshake can replay it.
    /// Returns the generation the sequence must present to
    /// [`claim_attempt`](Self::claim_attempt).
    pub fn enqueue(
        &self,
        session_id: &SessionId,
        notification: Notification,
        frame: Arc<String>,
    ) -> u64 {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(SessionEntry::new);
        entry.touch();
        entry.next_generation += 1;
        let generation = entry.next_generation;
        entry.delivery_confirmed = false;
        entry.pending = Some(Pending {
            notification,
            frame,
            generation,
            in_flight: true,
            sent: false,
            rebound: false,
        });
        generation
    }

    /// Start a replay sequence for an unacknowledged notification.
    ///
    /// Returns `None` when nothing is pending or a sequence is already
    /// running for it.
    pub fn begin_replay(&self, session_id: &SessionId) -> Option<u64> {
        let mut entry = self.sessions.get_mut(session_id)?;
        let pending = entry.pending.as_mut()?;
        if pending.in_flight {
            return None;
        }
        pending.in_flight = true;
        pending.rebound = false;
        Some(pending.generation)
    }

    /// Claim the next write for the sequence holding `generation`.
    pub fn claim_attempt(&self, session_id: &SessionId, generation: u64) -> Claim {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return Claim::Cleared;
        };
        let channel = entry.channel.clone();
        let Some(pending) = entry.pending.as_mut() else {
            return Claim::Cleared;
        };
        if pending.generation != generation {
            return Claim::Superseded;
        }
        pending.rebound = false;
        match channel {
            Some(channel) => Claim::Attempt {
                channel,
                frame: Arc::clone(&pending.frame),
            },
            None => {
                pending.in_flight = false;
                Claim::NoChannel
            }
        }
    }

    /// End the sequence holding `generation`.
    ///
    /// `delivered` marks the notification as sent (eligible for
    /// acknowledgement). Returns `true` if a new channel was bound after the
    /// last claim, meaning a replay to that channel is due right away. This
    /// holds whether or not the write to the old channel went through.
    pub fn finish_attempt(&self, session_id: &SessionId, generation: u64, delivered: bool) -> bool {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let Some(pending) = entry.pending.as_mut().filter(|p| p.generation == generation) else {
            return false;
        };
        pending.in_flight = false;
        if delivered {
            pending.sent = true;
        }
        std::mem::take(&mut pending.rebound)
    }

    /// Confirm receipt of the pending notification.
    ///
    /// Only a notification that has been written at least once is cleared,
    /// so an acknowledgement racing a fresh submission cannot swallow it.
    pub fn acknowledge(&self, session_id: &SessionId) -> bool {
        let Some(mut entry) = self.sessions.get_mut(session_id) else {
            return false;
        };
        entry.touch();
        if entry.pending.as_ref().is_some_and(|p| p.sent) {
            entry.pending = None;
            entry.delivery_confirmed = true;
            return true;
        }
        false
    }

    /// Remove sessions with no bound channel idle for at least `ttl`.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| entry.channel.is_some() || entry.last_activity.elapsed() < ttl);
        before.saturating_sub(self.sessions.len())
    }

    /// Pending notification for the session, if any.
    pub fn pending_notification(&self, session_id: &SessionId) -> Option<Notification> {
        self.sessions
            .get(session_id)
            .and_then(|entry| entry.pending.as_ref().map(|p| p.notification.clone()))
    }

    /// Whether the last notification was acknowledged.
    pub fn delivery_confirmed(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| entry.delivery_confirmed)
    }

    /// Whether the session row exists.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of session rows.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with a bound channel.
    pub fn connected_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.channel.is_some())
            .count()
    }
}
