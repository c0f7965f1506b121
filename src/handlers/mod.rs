pub mod checks;
pub mod health;
pub mod monitors;
pub mod results;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::AppState;
use crate::error::{AuthError, PipelineError};
use crate::pipeline::Rendered;

/// Count of fields that were zero-filled or dropped while decoding.
pub const DECODE_WARNINGS: HeaderName = HeaderName::from_static("x-decode-warnings");

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub access_token: Option<String>,
}

/// Token gate. Runs before any store work; a missing parameter counts as
/// the empty token.
pub(crate) fn authorize(state: &AppState, presented: Option<&str>) -> Result<(), AuthError> {
    match state.access_token.as_deref() {
        None => Ok(()),
        Some(expected) if presented.unwrap_or("") == expected => Ok(()),
        Some(_) => {
            tracing::warn!("rejected request with invalid access token");
            Err(AuthError)
        }
    }
}

pub(crate) fn json_response(rendered: Rendered) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if rendered.warnings > 0 {
        headers.insert(DECODE_WARNINGS, HeaderValue::from(rendered.warnings));
    }
    (headers, rendered.body).into_response()
}

pub(crate) fn failure(what: &str, e: PipelineError) -> (StatusCode, String) {
    tracing::error!("Failed to {what}: {e}");
    (e.status_code(), format!("{what} failed: {e}"))
}
