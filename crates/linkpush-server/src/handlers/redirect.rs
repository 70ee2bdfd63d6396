//! GET /{short_code}: redirect to the stored URL.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use linkpush_core::LinkError;
use tracing::debug;

use super::errors::ApiError;
use crate::server::AppState;

/// GET /{short_code}
///
/// `302 Found` with the original URL as `Location`, as stored.
pub async fn redirect(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
) -> Result<Response, ApiError> {
    let url = state.shortcodes.lookup(&short_code).inspect_err(|_| {
        debug!(code = %short_code, "unknown shortcode");
    })?;
    let location = HeaderValue::from_str(&url).map_err(|_| ApiError(LinkError::NotFound))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}
