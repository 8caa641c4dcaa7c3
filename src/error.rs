use crate::domain::{Money, MoneyError};
use crate::external::{BlobError, RateError, RenderError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by ledger and request-lifecycle operations.
#[derive(Debug, Error)]
pub enum FundingError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("illegal {entity} transition from {from} to {to}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("insufficient balance in {target}: available {available}, required {required}")]
    InsufficientBalance {
        target: String,
        available: Money,
        required: Money,
    },
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Money),
    #[error("ad account {ad_account_id} already has an unresolved withdrawal")]
    DuplicateUnresolvedWithdrawal { ad_account_id: Uuid },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("stale state: {0}")]
    StaleState(String),
    #[error(transparent)]
    Storage(#[from] BlobError),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("database error: {0}")]
    Db(sqlx::Error),
}

impl FundingError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        FundingError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FundingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FundingError::StaleState(_))
    }
}

/// SQLite result codes for SQLITE_BUSY/SQLITE_LOCKED and their extended forms.
const SQLITE_CONTENTION_CODES: [&str; 5] = ["5", "6", "261", "517", "773"];

pub(crate) fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| SQLITE_CONTENTION_CODES.contains(&code.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

impl From<sqlx::Error> for FundingError {
    fn from(err: sqlx::Error) -> Self {
        if is_contention(&err) {
            return FundingError::StaleState(format!("concurrent write conflict: {}", err));
        }
        FundingError::Db(err)
    }
}

impl From<MoneyError> for FundingError {
    fn from(err: MoneyError) -> Self {
        FundingError::validation("amount", err.to_string())
    }
}

/// HTTP-facing error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {message}")]
    Conflict { message: String, retryable: bool },
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<FundingError> for AppError {
    fn from(err: FundingError) -> Self {
        let retryable = err.is_retryable();
        match err {
            FundingError::Validation { .. } | FundingError::NegativeAmount(_) => {
                AppError::BadRequest(err.to_string())
            }
            FundingError::NotFound { .. } => AppError::NotFound(err.to_string()),
            FundingError::IllegalTransition { .. }
            | FundingError::DuplicateUnresolvedWithdrawal { .. }
            | FundingError::StaleState(_) => AppError::Conflict {
                message: err.to_string(),
                retryable,
            },
            FundingError::InsufficientBalance { .. } => AppError::Unprocessable(err.to_string()),
            FundingError::Storage(BlobError::TooLarge { .. })
            | FundingError::Storage(BlobError::UnsupportedType(_)) => {
                AppError::BadRequest(err.to_string())
            }
            FundingError::Storage(_)
            | FundingError::Rate(_)
            | FundingError::Render(_)
            | FundingError::Db(_) => {
                tracing::error!(error = %err, "request failed");
                AppError::Internal("internal error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, retryable) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, false),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, false),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, false),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, false),
            AppError::Conflict { message, retryable } => (StatusCode::CONFLICT, message, retryable),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, false),
        };

        let body = Json(json!({
            "error": error_message,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stale_state_is_retryable() {
        assert!(FundingError::StaleState("x".into()).is_retryable());
        assert!(!FundingError::InsufficientBalance {
            target: "main_wallet_idr".into(),
            available: Money::zero(),
            required: Money::from_units(1),
        }
        .is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let resp = AppError::from(FundingError::validation("account_id", "required")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(FundingError::DuplicateUnresolvedWithdrawal {
            ad_account_id: Uuid::nil(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::from(FundingError::not_found("transfer", "abc")).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = AppError::from(FundingError::InsufficientBalance {
            target: "main_wallet_idr".into(),
            available: Money::zero(),
            required: Money::from_units(5),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = FundingError::validation("fee_percentage", "required for approval");
        assert_eq!(err.to_string(), "invalid fee_percentage: required for approval");
    }
}
