use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use super::{authorize, failure, json_response};
use crate::AppState;
use crate::pipeline::parse_limit;

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    /// Kept as text so a malformed value degrades to 0 instead of a 400.
    pub limit: Option<String>,
    pub access_token: Option<String>,
}

pub async fn list_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> Result<Response, (StatusCode, String)> {
    authorize(&state, query.access_token.as_deref())?;

    let limit = parse_limit(query.limit.as_deref());
    let rendered = state
        .pipeline
        .results(&id, limit, state.deadline())
        .await
        .map_err(|e| failure("list results", e))?;
    Ok(json_response(rendered))
}
