use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{Currency, Money, WithdrawalRequest, WithdrawalStatus, WithdrawalUpdate};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub ad_account_id: Uuid,
    pub currency: Currency,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: WithdrawalStatus,
    #[serde(default)]
    pub verified_amount: Option<Money>,
    #[serde(default)]
    pub actual_balance_proof_url: Option<String>,
    #[serde(default)]
    pub after_withdrawal_proof_url: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), AppError> {
    let user_id = identity.require_client()?;
    let request = state
        .funding
        .create_withdrawal(user_id, body.ad_account_id, body.currency)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<Vec<WithdrawalRequest>>, AppError> {
    Ok(Json(state.funding.list_withdrawals(caller).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(state.funding.get_withdrawal(caller, id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    identity.require_admin()?;
    let update = WithdrawalUpdate {
        verified_amount: body.verified_amount,
        actual_balance_proof_url: body.actual_balance_proof_url,
        after_withdrawal_proof_url: body.after_withdrawal_proof_url,
        admin_notes: body.admin_notes,
    };
    let request = state
        .funding
        .update_withdrawal_status(id, body.status, update)
        .await?;
    Ok(Json(request))
}
