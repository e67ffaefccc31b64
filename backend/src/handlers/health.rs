//! Health check handler

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::AppState;

/// Health check that also verifies database connectivity
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": "ok",
    })))
}
