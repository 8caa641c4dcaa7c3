use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{NewTopUp, TopUpKind, TopUpReceipt, TopUpRequest};
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    identity: Identity,
    Json(body): Json<NewTopUp>,
) -> Result<(StatusCode, Json<TopUpReceipt>), AppError> {
    let user_id = identity.require_client()?;
    let receipt = state.funding.create_topup(kind, user_id, body).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    Identity(caller): Identity,
) -> Result<Json<Vec<TopUpRequest>>, AppError> {
    Ok(Json(state.funding.list_topups(kind, caller).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<TopUpRequest>, AppError> {
    Ok(Json(state.funding.get_topup(kind, caller, id).await?))
}

/// Raw proof image in the body, its type in `Content-Type`.
pub async fn upload_proof(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    identity: Identity,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TopUpRequest>, AppError> {
    let user_id = identity.require_client()?;
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Content-Type header required".into()))?;
    if body.is_empty() {
        return Err(AppError::BadRequest("proof file is empty".into()));
    }

    let request = state
        .funding
        .upload_proof(kind, user_id, id, body.to_vec(), mime_type)
        .await?;
    Ok(Json(request))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<TopUpRequest>, AppError> {
    let admin_id = identity.require_admin()?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = state
        .funding
        .verify_topup(kind, id, admin_id, body.admin_notes)
        .await?;
    Ok(Json(request))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    identity: Identity,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<TopUpRequest>, AppError> {
    let admin_id = identity.require_admin()?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = state
        .funding
        .reject_topup(kind, id, admin_id, body.admin_notes)
        .await?;
    Ok(Json(request))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(kind): Extension<TopUpKind>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<TopUpRequest>, AppError> {
    let user_id = identity.require_client()?;
    Ok(Json(state.funding.cancel_topup(kind, user_id, id).await?))
}
