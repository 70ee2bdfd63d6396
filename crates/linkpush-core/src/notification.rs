//! Push notification and client message wire types.
//!
//! Server → client frames:
//!
//! ```text
//! {"type":"sessionId","data":"<sessionId>"}
//! {"type":"shortenedUrl","sessionId":"<sessionId>","data":"<shortenedUrl>"}
//! ```
//!
//! Client → server frames:
//!
//! ```text
//! {"type":"acknowledge"}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::DeliveryError;
use crate::ids::SessionId;

/// Kind of a [`Notification`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The session identity assigned (or resumed) on handshake.
    SessionAssigned,
    /// A shortened URL produced by a submission.
    ShortenedUrl,
}

impl NotificationKind {
    /// Wire `type` string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionAssigned => "sessionId",
            Self::ShortenedUrl => "shortenedUrl",
        }
    }
}

/// A server → client push. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// Sent first on every connection so the client can persist its id.
    #[serde(rename = "sessionId")]
    SessionAssigned {
        /// The assigned session id.
        data: SessionId,
    },
    /// The result of a URL submission.
    #[serde(rename = "shortenedUrl", rename_all = "camelCase")]
    ShortenedUrl {
        /// Session the submission was made for.
        session_id: SessionId,
        /// Fully-qualified shortened URL.
        data: String,
    },
}

impl Notification {
    /// Build a `SessionAssigned` notification.
    pub fn session_assigned(session_id: SessionId) -> Self {
        Self::SessionAssigned { data: session_id }
    }

    /// Build a `ShortenedUrl` notification.
    pub fn shortened_url(session_id: SessionId, shortened_url: impl Into<String>) -> Self {
        Self::ShortenedUrl {
            session_id,
            data: shortened_url.into(),
        }
    }

    /// Notification kind.
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::SessionAssigned { .. } => NotificationKind::SessionAssigned,
            Self::ShortenedUrl { .. } => NotificationKind::ShortenedUrl,
        }
    }

    /// Session this notification is addressed to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionAssigned { data } => data,
            Self::ShortenedUrl { session_id, .. } => session_id,
        }
    }

    /// The `data` payload as a string.
    pub fn payload(&self) -> &str {
        match self {
            Self::SessionAssigned { data } => data.as_str(),
            Self::ShortenedUrl { data, .. } => data,
        }
    }

    /// Serialize to the JSON text frame written to the channel.
    pub fn encode(&self) -> Result<Arc<String>, DeliveryError> {
        Ok(Arc::new(serde_json::to_string(self)?))
    }
}

/// A client → server message.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// The client received the last pushed notification.
    #[serde(rename = "acknowledge")]
    Acknowledge,
    /// Any other `type`; ignored by the server.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame. Fails only on malformed JSON or a missing `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
