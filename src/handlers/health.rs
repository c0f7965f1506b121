use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::AppState;

/// Liveness only; never touches the store.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "schema": state.pipeline.schema().as_str(),
    }))
}
