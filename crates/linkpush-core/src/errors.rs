//! Error taxonomy.
//!
//! - [`LinkError`]: request-path failures surfaced to the HTTP caller
//!   (validation, unknown shortcode). Never retried.
//! - [`DeliveryError`]: a single failed channel write. Retried by the
//!   delivery engine and never surfaced to the submitter.
//!
//! A session with no bound channel is not an error; the delivery engine
//! reports it as a deferred outcome.

use thiserror::Error;

/// Request-path error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// `url` or `sessionId` was absent or empty.
    #[error("URL parameter and sessionId cookie are required")]
    MissingFields,
    /// `url` failed syntax validation.
    #[error("Invalid URL")]
    InvalidUrl,
    /// The request body could not be decoded.
    #[error("{0}")]
    MalformedRequest(String),
    /// No URL is stored under the requested shortcode.
    #[error("Shortened URL not found")]
    NotFound,
}

impl LinkError {
    /// Whether this is a caller input error (as opposed to a missing resource).
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MissingFields => "missing_fields",
            Self::InvalidUrl => "invalid_url",
            Self::MalformedRequest(_) => "malformed_request",
            Self::NotFound => "not_found",
        }
    }
}

/// Failure of one write attempt to a notification channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connection's writer has gone away.
    #[error("channel closed")]
    ChannelClosed,
    /// The connection's outbound queue is full.
    #[error("channel send queue full")]
    QueueFull,
    /// The notification could not be serialized.
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_match_wire_contract() {
        assert_eq!(
            LinkError::MissingFields.to_string(),
            "URL parameter and sessionId cookie are required"
        );
        assert_eq!(LinkError::InvalidUrl.to_string(), "Invalid URL");
        assert_eq!(LinkError::NotFound.to_string(), "Shortened URL not found");
    }

    #[test]
    fn classification() {
        assert!(LinkError::MissingFields.is_validation());
        assert!(LinkError::InvalidUrl.is_validation());
        assert!(LinkError::MalformedRequest("eof".into()).is_validation());
        assert!(!LinkError::NotFound.is_validation());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(LinkError::InvalidUrl.error_kind(), "invalid_url");
        assert_eq!(LinkError::NotFound.error_kind(), "not_found");
    }

    #[test]
    fn delivery_error_display() {
        assert_eq!(DeliveryError::ChannelClosed.to_string(), "channel closed");
        assert_eq!(DeliveryError::QueueFull.to_string(), "channel send queue full");
    }
}
