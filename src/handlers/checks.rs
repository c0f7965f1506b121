use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};

use super::{AccessQuery, authorize, failure, json_response};
use crate::AppState;

pub async fn list_checks(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, (StatusCode, String)> {
    authorize(&state, query.access_token.as_deref())?;

    let rendered = state
        .pipeline
        .checks(state.deadline())
        .await
        .map_err(|e| failure("list checks", e))?;
    Ok(json_response(rendered))
}
