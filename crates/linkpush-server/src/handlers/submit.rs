//! POST /url: shorten a URL and push the result to the submitting session.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use linkpush_core::{LinkError, Notification, SessionId, validate_url};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::errors::ApiError;
use crate::metrics::{SHORTCODES_CREATED_TOTAL, SUBMISSIONS_TOTAL};
use crate::server::AppState;
use crate::websocket::session::SESSION_COOKIE;

/// Submission body.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// URL to shorten.
    #[serde(default)]
    pub url: Option<String>,
    /// Session to notify. Falls back to the `sessionId` cookie.
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
}

/// POST /url
///
/// Responds `201` as soon as the notification is recorded; push delivery
/// runs in the background and never affects the response.
pub async fn submit_url(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let result = shorten(&state, &jar, payload);
    let outcome = match &result {
        Ok(_) => "accepted",
        Err(e) => e.0.error_kind(),
    };
    counter!(SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
    result
}

fn shorten(
    state: &AppState,
    jar: &CookieJar,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected submission body");
        ApiError::from(rejection)
    })?;

    let url = request.url.filter(|u| !u.is_empty());
    let session_id = request
        .session_id
        .filter(|s| !s.is_empty())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .filter(|s| !s.is_empty());
    let (Some(url), Some(session_id)) = (url, session_id) else {
        return Err(LinkError::MissingFields.into());
    };
    validate_url(&url)?;

    let (code, created) = state.shortcodes.resolve_or_assign(&url);
    if created {
        counter!(SHORTCODES_CREATED_TOTAL).increment(1);
    }
    let shortened = state.config.shortened_url(&code);
    let session_id = SessionId::from(session_id);
    info!(%session_id, %code, created, "url shortened");

    let notification = Notification::shortened_url(session_id.clone(), shortened);
    if let Err(e) = state.delivery.deliver_in_background(session_id.clone(), notification) {
        error!(%session_id, error = %e, "failed to enqueue notification");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "URL shortened successfully" })),
    ))
}
