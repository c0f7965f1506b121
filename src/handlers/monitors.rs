use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};

use super::{AccessQuery, authorize, failure, json_response};
use crate::AppState;

pub async fn list_monitors(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> Result<Response, (StatusCode, String)> {
    authorize(&state, query.access_token.as_deref())?;

    let rendered = state
        .pipeline
        .monitors(state.deadline())
        .await
        .map_err(|e| failure("list monitors", e))?;
    Ok(json_response(rendered))
}
