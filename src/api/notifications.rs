use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::Notification;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        state
            .funding
            .list_notifications(caller, params.unread_only)
            .await?,
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.funding.mark_notification_read(caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
