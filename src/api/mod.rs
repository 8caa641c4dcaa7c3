pub mod accounts;
pub mod health;
pub mod notifications;
pub mod topups;
pub mod transactions;
pub mod transfers;
pub mod wallets;
pub mod withdrawals;

use crate::domain::{Caller, Role, TopUpKind};
use crate::error::AppError;
use crate::external::DEFAULT_MAX_UPLOAD_BYTES;
use crate::orchestration::FundingService;
use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::request::Parts;
use axum::routing::{get, post, put};
use axum::{async_trait, Extension, Router};
use std::str::FromStr;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated role (`admin` or `client`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone)]
pub struct AppState {
    pub funding: FundingService,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(funding: FundingService) -> Self {
        Self {
            funding,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// The authenticated caller, read from the identity headers.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl Identity {
    /// The caller's id if they are an admin.
    pub fn require_admin(&self) -> Result<Uuid, AppError> {
        if self.0.is_admin() {
            Ok(self.0.user_id)
        } else {
            Err(AppError::Forbidden("admin role required".into()))
        }
    }

    pub fn require_client(&self) -> Result<Uuid, AppError> {
        if self.0.is_admin() {
            Err(AppError::Forbidden("client role required".into()))
        } else {
            Ok(self.0.user_id)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {}", USER_ID_HEADER)))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Unauthorized(format!("invalid {}", USER_ID_HEADER)))?;
        let role = match header(USER_ROLE_HEADER) {
            Some(raw) => Role::from_str(raw)
                .map_err(|_| AppError::Unauthorized(format!("invalid {}", USER_ROLE_HEADER)))?,
            None => Role::Client,
        };

        Ok(Identity(Caller { user_id, role }))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/users", post(wallets::create_user))
        .route("/v1/wallet", get(wallets::get_balances))
        .route("/v1/wallet/convert", post(wallets::convert))
        .route(
            "/v1/account-requests",
            get(accounts::list_requests).post(accounts::create_request),
        )
        .route("/v1/account-requests/:id", get(accounts::get_request))
        .route(
            "/v1/account-requests/:id/status",
            put(accounts::update_request_status),
        )
        .route("/v1/ad-accounts", get(accounts::list_accounts))
        .route("/v1/ad-accounts/:id", get(accounts::get_account))
        .nest("/v1/topups", topup_routes(TopUpKind::Account))
        .nest("/v1/wallet-topups", topup_routes(TopUpKind::Wallet))
        .route(
            "/v1/withdrawals",
            get(withdrawals::list).post(withdrawals::create),
        )
        .route("/v1/withdrawals/:id", get(withdrawals::get))
        .route("/v1/withdrawals/:id/status", put(withdrawals::update_status))
        .route("/v1/transfers", get(transfers::list).post(transfers::create))
        .route("/v1/transfers/:id", get(transfers::get))
        .route("/v1/transfers/:id/status", put(transfers::update_status))
        .route("/v1/transactions", get(transactions::list))
        .route("/v1/transactions/:id", get(transactions::get))
        .route("/v1/transactions/:id/invoice", get(transactions::invoice))
        .route("/v1/reports/transactions", get(transactions::summary))
        .route("/v1/notifications", get(notifications::list))
        .route("/v1/notifications/:id/read", post(notifications::mark_read))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Account and wallet top-ups share handlers; the kind rides along as an extension.
fn topup_routes(kind: TopUpKind) -> Router<AppState> {
    Router::new()
        .route("/", get(topups::list).post(topups::create))
        .route("/:id", get(topups::get))
        .route("/:id/proof", post(topups::upload_proof))
        .route("/:id/verify", post(topups::verify))
        .route("/:id/reject", post(topups::reject))
        .route("/:id/cancel", post(topups::cancel))
        .layer(Extension(kind))
}
