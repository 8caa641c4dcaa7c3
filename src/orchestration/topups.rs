//! Account and wallet top-ups: order, proof, verification, cancellation.

use super::{FundingService, TransactionChange, NEW_TRANSACTION_STATUS};
use crate::db::{BalanceTarget, Ledger, Repository};
use crate::domain::{
    AdAccountStatus, Caller, Currency, Money, NewNotification, NewTopUp, TimeMs, TopUpKind,
    TopUpReceipt, TopUpRequest, TopUpStatus, Transaction, WalletBucket,
};
use crate::engine::{ensure_transition, validate_amount};
use crate::error::FundingError;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

impl FundingService {
    /// Order a top-up. The client pays `total_with_unique_code` so the payment can
    /// be matched on the bank statement.
    pub async fn create_topup(
        &self,
        kind: TopUpKind,
        user_id: Uuid,
        order: NewTopUp,
    ) -> Result<TopUpReceipt, FundingError> {
        let amount = validate_amount(order.amount)?;
        let payment_method = order.payment_method.trim().to_string();
        if payment_method.is_empty() {
            return Err(FundingError::validation("payment_method", "must not be empty"));
        }
        self.get_user(user_id).await?;

        let ad_account_id = match kind {
            TopUpKind::Wallet => None,
            TopUpKind::Account => {
                let account_id = order.ad_account_id.ok_or_else(|| {
                    FundingError::validation("ad_account_id", "required for an account top-up")
                })?;
                let account = self
                    .get_ad_account(Caller::client(user_id), account_id)
                    .await?;
                if account.status != AdAccountStatus::Active {
                    return Err(FundingError::validation(
                        "ad_account_id",
                        format!("ad account is {}", account.status),
                    ));
                }
                if account.currency != order.currency {
                    return Err(FundingError::validation(
                        "currency",
                        format!("ad account is funded in {}", account.currency),
                    ));
                }
                Some(account_id)
            }
        };

        let unique_code = self.codes.next_code(order.currency).round2();
        let total_with_unique_code = (amount + unique_code).round2();
        let now = TimeMs::now();
        let request = TopUpRequest {
            id: Uuid::new_v4(),
            kind,
            user_id,
            ad_account_id,
            amount,
            currency: order.currency,
            unique_code,
            total_with_unique_code,
            payment_method,
            payment_proof: None,
            status: TopUpStatus::Pending,
            admin_id: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        let description = self.describe_topup(&request).await?;
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            request_id: request.id,
            tx_type: kind.transaction_type(),
            status: NEW_TRANSACTION_STATUS,
            description,
            currency: request.currency,
            amount,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        Repository::insert_topup(&mut tx, &request).await?;
        Repository::insert_transaction(&mut tx, &transaction).await?;
        Repository::insert_notification(
            &mut tx,
            &NewNotification::for_admins(
                format!("new_{}", kind.label()),
                request.id,
                format!("New {}", kind.entity()),
                format!(
                    "{} {} ordered, awaiting payment of {}",
                    request.amount, request.currency, request.total_with_unique_code
                ),
            ),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            request_id = %request.id,
            kind = kind.label(),
            amount = %request.amount,
            unique_code = %request.unique_code,
            "top-up created"
        );
        self.email_admins(
            "new_topup",
            json!({ "request_id": request.id, "kind": kind, "amount": request.amount, "currency": request.currency }),
        );
        Ok(TopUpReceipt {
            request_id: request.id,
            unique_code,
            total_with_unique_code,
        })
    }

    /// Store an uploaded proof and attach it. The blob is written before any
    /// database work and removed again if attaching fails.
    pub async fn upload_proof(
        &self,
        kind: TopUpKind,
        user_id: Uuid,
        request_id: Uuid,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<TopUpRequest, FundingError> {
        self.get_topup(kind, Caller::client(user_id), request_id)
            .await?;
        let blob_ref = self.blobs.put(bytes, mime_type).await?;

        match self.attach_proof(kind, user_id, request_id, &blob_ref).await {
            Ok(request) => Ok(request),
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&blob_ref).await {
                    warn!(blob_ref = %blob_ref, error = %cleanup, "orphaned proof blob");
                }
                Err(e)
            }
        }
    }

    /// Attach a stored proof. A pending request moves to `proof_uploaded`; one
    /// already there just has its proof replaced.
    pub async fn attach_proof(
        &self,
        kind: TopUpKind,
        user_id: Uuid,
        request_id: Uuid,
        blob_ref: &str,
    ) -> Result<TopUpRequest, FundingError> {
        let request = self
            .get_topup(kind, Caller::client(user_id), request_id)
            .await?;
        let now = TimeMs::now();

        if request.status == TopUpStatus::ProofUploaded {
            let mut tx = self.repo.begin().await?;
            Repository::replace_topup_proof(
                &mut tx,
                kind,
                request_id,
                request.payment_proof.as_deref(),
                blob_ref,
                now,
            )
            .await?;
            tx.commit().await?;

            if let Some(previous) = request.payment_proof.as_deref() {
                if previous != blob_ref {
                    if let Err(e) = self.blobs.delete(previous).await {
                        warn!(blob_ref = %previous, error = %e, "replaced proof not deleted");
                    }
                }
            }
            info!(request_id = %request_id, "payment proof replaced");
            return self.load_topup(kind, request_id).await;
        }

        let from = request.status;
        let to = TopUpStatus::ProofUploaded;
        let description = self.describe_topup(&request).await?;
        let mut tx = self
            .begin_transition(kind.table(), request_id, from, to, now)
            .await?;
        Repository::set_topup_proof(&mut tx, kind, request_id, blob_ref).await?;
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(description),
            NewNotification::for_admins(
                format!("{}_proof_uploaded", kind.label()),
                request_id,
                "Payment proof uploaded",
                format!(
                    "Proof uploaded for {} {} {}",
                    kind.entity(),
                    request.amount,
                    request.currency
                ),
            ),
            now,
        )
        .await?;

        self.email_admins(
            "topup_proof_uploaded",
            json!({ "request_id": request_id, "kind": kind }),
        );
        self.load_topup(kind, request_id).await
    }

    /// Admin confirms the payment arrived: credit the account or wallet by `amount`.
    pub async fn verify_topup(
        &self,
        kind: TopUpKind,
        request_id: Uuid,
        admin_id: Uuid,
        admin_notes: Option<String>,
    ) -> Result<TopUpRequest, FundingError> {
        let request = self.load_topup(kind, request_id).await?;
        let from = request.status;
        let to = TopUpStatus::Verified;
        let description = self.describe_topup(&request).await?;
        let now = TimeMs::now();

        let mut tx = self
            .begin_transition(kind.table(), request_id, from, to, now)
            .await?;
        Repository::record_topup_decision(
            &mut tx,
            kind,
            request_id,
            Some(admin_id),
            admin_notes.as_deref(),
        )
        .await?;

        let ledger = Ledger::new(Some(request_id), now);
        match (kind, request.ad_account_id) {
            (TopUpKind::Account, Some(account_id)) => {
                ledger
                    .credit_topup(&mut tx, account_id, request.amount)
                    .await?;
            }
            (TopUpKind::Account, None) => {
                return Err(FundingError::validation(
                    "ad_account_id",
                    "account top-up has no target account",
                ));
            }
            (TopUpKind::Wallet, _) => {
                ledger
                    .credit(
                        &mut tx,
                        BalanceTarget::Wallet {
                            user_id: request.user_id,
                            bucket: WalletBucket::main(request.currency),
                        },
                        request.amount,
                    )
                    .await?;
            }
        }

        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(description),
            NewNotification::for_client(
                request.user_id,
                format!("{}_verified", kind.label()),
                request_id,
                "Top-up verified",
                format!("{} {} has been credited", request.amount, request.currency),
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "topup_verified",
            json!({ "request_id": request_id, "amount": request.amount, "currency": request.currency }),
        );
        self.load_topup(kind, request_id).await
    }

    pub async fn reject_topup(
        &self,
        kind: TopUpKind,
        request_id: Uuid,
        admin_id: Uuid,
        admin_notes: Option<String>,
    ) -> Result<TopUpRequest, FundingError> {
        let request = self.load_topup(kind, request_id).await?;
        let from = request.status;
        let to = TopUpStatus::Rejected;
        let description = self.describe_topup(&request).await?;
        let now = TimeMs::now();

        let mut tx = self
            .begin_transition(kind.table(), request_id, from, to, now)
            .await?;
        Repository::record_topup_decision(
            &mut tx,
            kind,
            request_id,
            Some(admin_id),
            admin_notes.as_deref(),
        )
        .await?;
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(description),
            NewNotification::for_client(
                request.user_id,
                format!("{}_rejected", kind.label()),
                request_id,
                "Top-up rejected",
                admin_notes
                    .clone()
                    .unwrap_or_else(|| "Your payment could not be verified".to_string()),
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "topup_rejected",
            json!({ "request_id": request_id, "notes": admin_notes }),
        );
        self.load_topup(kind, request_id).await
    }

    /// Client withdraws an order they have not paid yet.
    pub async fn cancel_topup(
        &self,
        kind: TopUpKind,
        user_id: Uuid,
        request_id: Uuid,
    ) -> Result<TopUpRequest, FundingError> {
        let request = self
            .get_topup(kind, Caller::client(user_id), request_id)
            .await?;
        let from = request.status;
        let to = TopUpStatus::Cancelled;
        if from != TopUpStatus::Pending {
            return Err(FundingError::IllegalTransition {
                entity: kind.entity(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let description = self.describe_topup(&request).await?;
        let now = TimeMs::now();

        let tx = self
            .begin_transition(kind.table(), request_id, from, to, now)
            .await?;
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(description),
            NewNotification::for_admins(
                format!("{}_cancelled", kind.label()),
                request_id,
                "Top-up cancelled",
                format!("The client cancelled a {}", kind.entity()),
            ),
            now,
        )
        .await?;
        self.load_topup(kind, request_id).await
    }

    /// Cancel a top-up that waited too long for payment. Used by the scheduler.
    pub(crate) async fn expire_topup(
        &self,
        request: &TopUpRequest,
        now: TimeMs,
    ) -> Result<(), FundingError> {
        let kind = request.kind;
        let from = request.status;
        let to = TopUpStatus::Cancelled;
        ensure_transition(from, to)?;
        let description = self.describe_topup(request).await?;

        let tx = self
            .begin_transition(kind.table(), request.id, from, to, now)
            .await?;
        self.finish_transition(
            tx,
            request.id,
            from,
            to,
            TransactionChange::describe(description),
            NewNotification::for_client(
                request.user_id,
                format!("{}_auto_cancelled", kind.label()),
                request.id,
                "Top-up expired",
                format!(
                    "Your {} of {} {} was cancelled because no payment was confirmed in time",
                    kind.entity(),
                    request.amount,
                    request.currency
                ),
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "topup_auto_cancelled",
            json!({ "request_id": request.id, "amount": request.amount, "currency": request.currency }),
        );
        Ok(())
    }

    pub async fn get_topup(
        &self,
        kind: TopUpKind,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<TopUpRequest, FundingError> {
        self.repo
            .get_topup(kind, request_id)
            .await?
            .filter(|r| caller.can_see(r.user_id))
            .ok_or_else(|| FundingError::not_found(kind.entity(), request_id))
    }

    pub async fn list_topups(
        &self,
        kind: TopUpKind,
        caller: Caller,
    ) -> Result<Vec<TopUpRequest>, FundingError> {
        self.repo.list_topups(kind, caller.scope()).await
    }

    async fn load_topup(&self, kind: TopUpKind, request_id: Uuid) -> Result<TopUpRequest, FundingError> {
        self.repo
            .get_topup(kind, request_id)
            .await?
            .ok_or_else(|| FundingError::not_found(kind.entity(), request_id))
    }

    /// Description naming the account as it is called right now.
    async fn describe_topup(&self, request: &TopUpRequest) -> Result<String, FundingError> {
        let amount = format_amount(request.amount, request.currency);
        match request.ad_account_id {
            Some(account_id) => {
                let name = self
                    .repo
                    .get_ad_account(account_id)
                    .await?
                    .map(|a| a.account_name)
                    .unwrap_or_else(|| account_id.to_string());
                Ok(format!("Top up {} to {}", amount, name))
            }
            None => Ok(format!("Wallet top up {}", amount)),
        }
    }
}

pub(crate) fn format_amount(amount: Money, currency: Currency) -> String {
    format!("{} {}", amount.to_display_string(), currency)
}
