use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{AccountDecision, AccountRequest, AccountRequestStatus, AdAccount, Money, NewAccountRequest};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateBody {
    pub status: AccountRequestStatus,
    #[serde(default)]
    pub fee_percentage: Option<Money>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn create_request(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<NewAccountRequest>,
) -> Result<(StatusCode, Json<AccountRequest>), AppError> {
    let user_id = identity.require_client()?;
    let request = state.funding.create_account_request(user_id, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<Vec<AccountRequest>>, AppError> {
    Ok(Json(state.funding.list_account_requests(caller).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountRequest>, AppError> {
    Ok(Json(state.funding.get_account_request(caller, id).await?))
}

pub async fn update_request_status(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdateBody>,
) -> Result<Json<AccountRequest>, AppError> {
    identity.require_admin()?;
    let decision = AccountDecision {
        fee_percentage: body.fee_percentage,
        account_id: body.account_id,
        account_name: body.account_name,
        admin_notes: body.admin_notes,
    };
    let request = state
        .funding
        .update_account_request_status(id, body.status, decision)
        .await?;
    Ok(Json(request))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    Identity(caller): Identity,
) -> Result<Json<Vec<AdAccount>>, AppError> {
    Ok(Json(state.funding.list_ad_accounts(caller).await?))
}

pub async fn get_account(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<AdAccount>, AppError> {
    Ok(Json(state.funding.get_ad_account(caller, id).await?))
}
