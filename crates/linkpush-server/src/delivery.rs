//! Delivery engine: at-least-once push of a session's pending notification.
//!
//! A retry sequence is an explicit attempt-count loop over
//! [`SessionRegistry::claim_attempt`], sleeping on the tokio timer between
//! attempts. Each sequence runs on its own task, so a slow or dead channel
//! only delays its own session.

use std::sync::Arc;
use std::time::Duration;

use linkpush_core::{DeliveryError, Notification, SessionId};
use linkpush_store::{Claim, SessionRegistry};
use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::metrics::{
    ACKNOWLEDGEMENTS_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_DEFERRED_TOTAL,
    DELIVERY_EXHAUSTED_TOTAL, DELIVERY_FAILURES_TOTAL, NOTIFICATIONS_ENQUEUED_TOTAL,
    REPLAYS_TOTAL,
};

/// Bounded fixed-delay retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed write.
    pub max_retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Total writes a sequence may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// How a retry sequence ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A write succeeded.
    Delivered {
        /// Writes made, including the successful one.
        attempts: u32,
    },
    /// No channel was bound; the notification waits for a reconnect.
    Deferred,
    /// Every write failed; the notification waits for a reconnect.
    Exhausted {
        /// Writes made.
        attempts: u32,
    },
    /// A newer notification replaced this one mid-sequence.
    Superseded,
    /// The notification was acknowledged or its session evicted.
    Cleared,
}

/// Pushes notifications to session channels.
pub struct DeliveryEngine {
    registry: Arc<SessionRegistry>,
    policy: RetryPolicy,
}

impl DeliveryEngine {
    /// Create an engine over `registry`.
    pub fn new(registry: Arc<SessionRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    /// The session registry this engine writes through.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record `notification` as pending and run its retry sequence.
    pub async fn deliver(
        &self,
        session_id: &SessionId,
        notification: Notification,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let generation = self.enqueue(session_id, notification)?;
        Ok(self.run(session_id, generation).await)
    }

    /// Record `notification` as pending now and run its retry sequence on a
    /// background task.
    ///
    /// Once this returns, a reconnect is guaranteed to see the notification.
    pub fn deliver_in_background(
        self: &Arc<Self>,
        session_id: SessionId,
        notification: Notification,
    ) -> Result<(), DeliveryError> {
        let generation = self.enqueue(&session_id, notification)?;
        let engine = Arc::clone(self);
        drop(tokio::spawn(async move {
            let _ = engine.run(&session_id, generation).await;
        }));
        Ok(())
    }

    /// Re-send the session's unacknowledged notification, if any.
    ///
    /// Returns `None` when nothing is pending or a sequence for it is
    /// already running.
    pub async fn replay(&self, session_id: &SessionId) -> Option<DeliveryOutcome> {
        let generation = self.registry.begin_replay(session_id)?;
        counter!(REPLAYS_TOTAL).increment(1);
        info!(%session_id, "replaying unacknowledged notification");
        Some(self.run(session_id, generation).await)
    }

    /// Client confirmed receipt of the last notification.
    pub fn acknowledge(&self, session_id: &SessionId) -> bool {
        let cleared = self.registry.acknowledge(session_id);
        if cleared {
            counter!(ACKNOWLEDGEMENTS_TOTAL).increment(1);
            info!(%session_id, "client acknowledged notification");
        } else {
            debug!(%session_id, "acknowledge with nothing delivered, ignoring");
        }
        cleared
    }

    fn enqueue(
        &self,
        session_id: &SessionId,
        notification: Notification,
    ) -> Result<u64, DeliveryError> {
        let frame = notification.encode()?;
        let kind = notification.kind().as_str();
        let generation = self.registry.enqueue(session_id, notification, frame);
        counter!(NOTIFICATIONS_ENQUEUED_TOTAL).increment(1);
        debug!(%session_id, kind, generation, "notification enqueued");
        Ok(generation)
    }

    /// A reconnect landed while a write was in flight, so the handshake could
    /// not start its own replay. Take it over here.
    fn restart_on_new_channel(&self, session_id: &SessionId) -> Option<u64> {
        let next = self.registry.begin_replay(session_id)?;
        counter!(REPLAYS_TOTAL).increment(1);
        info!(%session_id, "channel rebound during delivery, replaying to new channel");
        Some(next)
    }

    async fn run(&self, session_id: &SessionId, mut generation: u64) -> DeliveryOutcome {
        let mut attempt: u32 = 0;
        loop {
            let (channel, frame) = match self.registry.claim_attempt(session_id, generation) {
                Claim::Attempt { channel, frame } => (channel, frame),
                Claim::NoChannel => {
                    counter!(DELIVERY_DEFERRED_TOTAL).increment(1);
                    debug!(%session_id, "no channel bound, deferring until reconnect");
                    return DeliveryOutcome::Deferred;
                }
                Claim::Superseded => {
                    debug!(%session_id, generation, "superseded by a newer notification");
                    return DeliveryOutcome::Superseded;
                }
                Claim::Cleared => return DeliveryOutcome::Cleared,
            };

            attempt += 1;
            counter!(DELIVERY_ATTEMPTS_TOTAL).increment(1);
            let connection_id = channel.connection_id().clone();

            match channel.send(frame) {
                Ok(()) => {
                    let rebound = self.registry.finish_attempt(session_id, generation, true);
                    debug!(%session_id, %connection_id, attempt, "notification delivered");
                    if rebound {
                        if let Some(next) = self.restart_on_new_channel(session_id) {
                            generation = next;
                            attempt = 0;
                            continue;
                        }
                    }
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    counter!(DELIVERY_FAILURES_TOTAL).increment(1);
                    warn!(
                        %session_id,
                        %connection_id,
                        attempt,
                        error = %e,
                        "delivery attempt failed"
                    );
                }
            }

            if attempt >= self.policy.max_attempts() {
                counter!(DELIVERY_EXHAUSTED_TOTAL).increment(1);
                error!(
                    %session_id,
                    attempts = attempt,
                    "maximum retry attempts reached, notification kept for replay"
                );
                let rebound = self.registry.finish_attempt(session_id, generation, false);
                if rebound {
                    if let Some(next) = self.restart_on_new_channel(session_id) {
                        generation = next;
                        attempt = 0;
                        continue;
                    }
                }
                return DeliveryOutcome::Exhausted { attempts: attempt };
            }

            debug!(%session_id, delay = ?self.policy.delay, "retrying");
            tokio::time::sleep(self.policy.delay).await;
        }
    }
}
