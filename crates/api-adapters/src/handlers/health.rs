use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store = match state.store.ping().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };
    Json(json!({
        "status": 200,
        "message": "server is running",
        "store": store,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|err| ApiError::internal(format!("metrics encoding failed: {err}")))?;
    Ok((
        [(CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        body,
    ))
}
