//! Transfers from a user's main wallet into one of their ad accounts.

use super::topups::format_amount;
use super::{FundingService, TransactionChange, NEW_TRANSACTION_STATUS};
use crate::db::{BalanceTarget, Ledger, Repository};
use crate::domain::{
    AdAccountStatus, Caller, Money, NewNotification, TimeMs, Transaction, TransactionType,
    TransferRequest, TransferStatus, WalletBucket,
};
use crate::engine::{compute_fee, validate_amount};
use crate::error::FundingError;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

const TABLE: &str = "transfer_requests";

impl FundingService {
    /// Request a transfer of `amount` into an ad account. The fee comes from the
    /// account's fee percentage; `amount + fee` is what approval debits.
    ///
    /// The wallet is not checked here. Funds are only required at approval.
    pub async fn create_transfer(
        &self,
        user_id: Uuid,
        ad_account_id: Uuid,
        amount: Money,
    ) -> Result<TransferRequest, FundingError> {
        let amount = validate_amount(amount)?;
        let account = self
            .get_ad_account(Caller::client(user_id), ad_account_id)
            .await?;
        if account.status != AdAccountStatus::Active {
            return Err(FundingError::validation(
                "ad_account_id",
                format!("ad account is {}", account.status),
            ));
        }

        let fee = compute_fee(amount, account.fee_percentage);
        let total = (amount + fee).round2();
        let now = TimeMs::now();
        let request = TransferRequest {
            id: Uuid::new_v4(),
            user_id,
            ad_account_id,
            amount,
            fee_percentage: account.fee_percentage,
            fee,
            total,
            currency: account.currency,
            status: TransferStatus::Pending,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            request_id: request.id,
            tx_type: TransactionType::Transfer,
            status: NEW_TRANSACTION_STATUS,
            description: describe(&request, &account.account_name),
            currency: request.currency,
            amount: total,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        Repository::insert_transfer(&mut tx, &request).await?;
        Repository::insert_transaction(&mut tx, &transaction).await?;
        Repository::insert_notification(
            &mut tx,
            &NewNotification::for_admins(
                "new_transfer",
                request.id,
                "New transfer request",
                transaction.description.clone(),
            ),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(request_id = %request.id, %amount, %fee, "transfer created");
        self.email_admins(
            "new_transfer",
            json!({ "request_id": request.id, "amount": amount, "fee": fee, "currency": request.currency }),
        );
        Ok(request)
    }

    /// Approve or reject a pending transfer.
    ///
    /// Approval debits `main_wallet_<currency>` by `amount + fee` and credits the
    /// account by `amount`. If the wallet cannot cover it the call fails with
    /// `InsufficientBalance` and the request stays pending.
    pub async fn update_transfer_status(
        &self,
        request_id: Uuid,
        to: TransferStatus,
        admin_notes: Option<String>,
    ) -> Result<TransferRequest, FundingError> {
        let request = self.load_transfer(request_id).await?;
        let from = request.status;
        let account_name = self
            .repo
            .get_ad_account(request.ad_account_id)
            .await?
            .map(|a| a.account_name)
            .unwrap_or_else(|| request.ad_account_id.to_string());
        let now = TimeMs::now();

        let mut tx = self
            .begin_transition(TABLE, request_id, from, to, now)
            .await?;
        Repository::set_transfer_notes(&mut tx, request_id, admin_notes.as_deref()).await?;

        if to == TransferStatus::Approved {
            let moved = Ledger::new(Some(request_id), now)
                .transfer(
                    &mut tx,
                    BalanceTarget::Wallet {
                        user_id: request.user_id,
                        bucket: WalletBucket::main(request.currency),
                    },
                    BalanceTarget::AdAccount {
                        id: request.ad_account_id,
                    },
                    request.amount,
                    request.fee,
                )
                .await;
            if let Err(e) = moved {
                warn!(request_id = %request_id, error = %e, "transfer approval failed");
                return Err(e);
            }
        }

        let (title, message) = match to {
            TransferStatus::Approved => (
                "Transfer approved",
                format!(
                    "{} has been added to {}",
                    format_amount(request.amount, request.currency),
                    account_name
                ),
            ),
            _ => (
                "Transfer rejected",
                admin_notes
                    .clone()
                    .unwrap_or_else(|| format!("Your transfer to {} was rejected", account_name)),
            ),
        };
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(describe(&request, &account_name)),
            NewNotification::for_client(
                request.user_id,
                format!("transfer_{}", to),
                request_id,
                title,
                message,
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "transfer_status",
            json!({ "request_id": request_id, "status": to, "amount": request.amount }),
        );
        self.load_transfer(request_id).await
    }

    pub async fn get_transfer(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<TransferRequest, FundingError> {
        self.repo
            .get_transfer(request_id)
            .await?
            .filter(|r| caller.can_see(r.user_id))
            .ok_or_else(|| FundingError::not_found("transfer", request_id))
    }

    pub async fn list_transfers(&self, caller: Caller) -> Result<Vec<TransferRequest>, FundingError> {
        self.repo.list_transfers(caller.scope()).await
    }

    async fn load_transfer(&self, request_id: Uuid) -> Result<TransferRequest, FundingError> {
        self.repo
            .get_transfer(request_id)
            .await?
            .ok_or_else(|| FundingError::not_found("transfer", request_id))
    }
}

fn describe(request: &TransferRequest, account_name: &str) -> String {
    format!(
        "Transfer {} to {} (fee {})",
        format_amount(request.amount, request.currency),
        account_name,
        request.fee.to_display_string()
    )
}
