//! HTTP mapping of request-path errors.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use linkpush_core::LinkError;
use serde_json::json;

/// A [`LinkError`] rendered as `{"error": <message>}`.
#[derive(Debug)]
pub struct ApiError(pub LinkError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match self.0 {
            LinkError::NotFound => StatusCode::NOT_FOUND,
            LinkError::MissingFields | LinkError::InvalidUrl | LinkError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LinkError::MalformedRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
