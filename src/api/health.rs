use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("SELECT 1")
        .execute(state.funding.repo().pool())
        .await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}
