use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use super::{AppState, Identity};
use crate::domain::{Transaction, TransactionFilter, TransactionSummary};
use crate::error::AppError;

/// `?type=&status=&start_date=&end_date=`; bad values are ignored, not rejected.
pub async fn list(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.funding.list_transactions(caller, &filter).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.funding.get_transaction(caller, id).await?))
}

pub async fn summary(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<TransactionSummary>>, AppError> {
    Ok(Json(
        state.funding.summarize_transactions(caller, &filter).await?,
    ))
}

pub async fn invoice(
    State(state): State<AppState>,
    Identity(caller): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let pdf = state.funding.render_invoice(caller, id).await?;
    let disposition = format!("inline; filename=\"invoice-{}.pdf\"", id.simple());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
