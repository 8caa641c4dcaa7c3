use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{Money, TransferRequest, TransferStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub ad_account_id: Uuid,
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TransferStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<TransferRequest>), AppError> {
    let user_id = identity.require_client()?;
    let request = state
        .funding
        .create_transfer(user_id, body.ad_account_id, body.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<Vec<TransferRequest>>, AppError> {
    Ok(Json(state.funding.list_transfers(caller).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<TransferRequest>, AppError> {
    Ok(Json(state.funding.get_transfer(caller, id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<TransferRequest>, AppError> {
    identity.require_admin()?;
    let request = state
        .funding
        .update_transfer_status(id, body.status, body.admin_notes)
        .await?;
    Ok(Json(request))
}
