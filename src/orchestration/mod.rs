//! The funding core: request lifecycles, ledger movements and notifications.
//!
//! Every status change goes through the same path. Read the current status, check
//! the transition table, then open a database transaction whose first write is the
//! status compare-and-set, apply the ledger effect, sync the paired transaction row
//! and record the notification, and commit. Email goes out after the commit.

pub mod accounts;
pub mod notify;
pub mod scheduler;
pub mod topups;
pub mod transfers;
pub mod wallets;
pub mod withdrawals;

pub use scheduler::{SchedulerService, SweepReport};
pub use wallets::WalletConversion;

use crate::db::Repository;
use crate::domain::{Money, NewNotification, TimeMs, TransactionStatus};
use crate::engine::{ensure_transition, Lifecycle};
use crate::error::FundingError;
use crate::external::{
    BlobStore, DocumentRenderer, LogMailer, Mailer, MemoryBlobStore, PdfInvoiceRenderer,
    RandomCodes, RateProvider, StaticRates, UniqueCodeGenerator, DEFAULT_MAX_UPLOAD_BYTES,
};
use sqlx::Sqlite;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Tunables of the funding core.
#[derive(Debug, Clone)]
pub struct FundingConfig {
    /// How long a top-up may wait for payment before the scheduler cancels it.
    pub topup_expiry_ms: i64,
    /// Recipient of admin-facing emails. No admin email is sent when unset.
    pub admin_email: Option<String>,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            topup_expiry_ms: 24 * HOUR_MS,
            admin_email: None,
        }
    }
}

/// Entry point for every funding operation. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FundingService {
    repo: Arc<Repository>,
    config: FundingConfig,
    mailer: Arc<dyn Mailer>,
    blobs: Arc<dyn BlobStore>,
    rates: Arc<dyn RateProvider>,
    renderer: Arc<dyn DocumentRenderer>,
    codes: Arc<dyn UniqueCodeGenerator>,
}

impl FundingService {
    /// A service with in-process collaborators: log-only email, in-memory proof
    /// storage, a static exchange rate and random unique codes.
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            config: FundingConfig::default(),
            mailer: Arc::new(LogMailer),
            blobs: Arc::new(MemoryBlobStore::new(DEFAULT_MAX_UPLOAD_BYTES)),
            rates: Arc::new(StaticRates::new(15_500.0)),
            renderer: Arc::new(PdfInvoiceRenderer),
            codes: Arc::new(RandomCodes),
        }
    }

    pub fn with_config(mut self, config: FundingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_rates(mut self, rates: Arc<dyn RateProvider>) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_codes(mut self, codes: Arc<dyn UniqueCodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn config(&self) -> &FundingConfig {
        &self.config
    }

    /// Check `from -> to`, then open a transaction that has already claimed it.
    ///
    /// The claim is the transaction's first statement, so SQLite takes the write
    /// lock before anything is read and a concurrent loser sees `StaleState`.
    pub(crate) async fn begin_transition<S: Lifecycle>(
        &self,
        table: &'static str,
        id: Uuid,
        from: S,
        to: S,
        now: TimeMs,
    ) -> Result<sqlx::Transaction<'static, Sqlite>, FundingError> {
        ensure_transition(from, to)?;
        let mut tx = self.repo.begin().await?;
        Repository::claim_status(
            &mut tx,
            table,
            id,
            &from.to_string(),
            &to.to_string(),
            now,
        )
        .await?;
        Ok(tx)
    }

    /// Sync the transaction row, record the notification and commit.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn finish_transition<S: Lifecycle>(
        &self,
        mut tx: sqlx::Transaction<'static, Sqlite>,
        request_id: Uuid,
        from: S,
        to: S,
        change: TransactionChange,
        notification: NewNotification,
        now: TimeMs,
    ) -> Result<(), FundingError> {
        Repository::sync_transaction(
            &mut tx,
            request_id,
            to.transaction_status(),
            &change.description,
            change.amount,
            now,
        )
        .await?;
        Repository::insert_notification(&mut tx, &notification, now).await?;
        tx.commit().await?;

        info!(
            entity = S::ENTITY,
            request_id = %request_id,
            from = %from,
            to = %to,
            "request transitioned"
        );
        Ok(())
    }
}

/// What a transition writes onto the paired transaction row besides its status.
#[derive(Debug, Clone)]
pub(crate) struct TransactionChange {
    pub description: String,
    pub amount: Option<Money>,
}

impl TransactionChange {
    pub fn describe(description: String) -> Self {
        Self {
            description,
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Initial status of every transaction row.
pub(crate) const NEW_TRANSACTION_STATUS: TransactionStatus = TransactionStatus::Pending;
