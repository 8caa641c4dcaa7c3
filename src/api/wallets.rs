use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{Currency, Money, Role, User, WalletBalances};
use crate::error::AppError;
use crate::orchestration::WalletConversion;

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub email: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Client
}

#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    /// Admins may read another user's wallets.
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    pub from: Currency,
    pub to: Currency,
    pub amount: Money,
}

/// Admin-only: user provisioning happens in the auth service; this mirrors it here.
pub async fn create_user(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<CreateUserBody>,
) -> Result<(StatusCode, Json<User>), AppError> {
    identity.require_admin()?;
    let user = state
        .funding
        .create_user(&body.email, &body.name, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_balances(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Query(params): Query<BalancesQuery>,
) -> Result<Json<WalletBalances>, AppError> {
    let user_id = match params.user_id {
        Some(user_id) if caller.can_see(user_id) => user_id,
        Some(_) => return Err(AppError::Forbidden("cannot read another user's wallet".into())),
        None => caller.user_id,
    };
    Ok(Json(state.funding.get_wallet_balances(user_id).await?))
}

pub async fn convert(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<ConvertBody>,
) -> Result<Json<WalletConversion>, AppError> {
    let user_id = identity.require_client()?;
    let conversion = state
        .funding
        .convert_wallet(user_id, body.from, body.to, body.amount)
        .await?;
    Ok(Json(conversion))
}
