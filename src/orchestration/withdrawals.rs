//! Withdrawals: moving what is left on an ad account back to the user's withdrawal wallet.

use super::topups::format_amount;
use super::{FundingService, TransactionChange, NEW_TRANSACTION_STATUS};
use crate::db::{BalanceTarget, Ledger, Repository};
use crate::domain::{
    AdAccount, Caller, Currency, Money, NewNotification, TimeMs, Transaction, TransactionType,
    WalletBucket, WithdrawalRequest, WithdrawalStatus, WithdrawalUpdate,
};
use crate::engine::ensure_transition;
use crate::error::FundingError;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const TABLE: &str = "withdrawal_requests";

impl FundingService {
    /// Open a withdrawal for an ad account. Fails with `DuplicateUnresolvedWithdrawal`
    /// while another withdrawal on the same account is still pending, processing or approved.
    pub async fn create_withdrawal(
        &self,
        user_id: Uuid,
        ad_account_id: Uuid,
        currency: Currency,
    ) -> Result<WithdrawalRequest, FundingError> {
        let account = self
            .get_ad_account(Caller::client(user_id), ad_account_id)
            .await?;
        if account.currency != currency {
            return Err(FundingError::validation(
                "currency",
                format!("ad account is funded in {}", account.currency),
            ));
        }
        if self
            .repo
            .find_unresolved_withdrawal(ad_account_id)
            .await?
            .is_some()
        {
            return Err(FundingError::DuplicateUnresolvedWithdrawal { ad_account_id });
        }

        let now = TimeMs::now();
        let request = WithdrawalRequest {
            id: Uuid::new_v4(),
            user_id,
            ad_account_id,
            currency: account.currency,
            status: WithdrawalStatus::Pending,
            verified_amount: None,
            actual_balance_proof_url: None,
            after_withdrawal_proof_url: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            request_id: request.id,
            tx_type: TransactionType::WithdrawRequest,
            status: NEW_TRANSACTION_STATUS,
            description: describe(&account, account.balance),
            currency: account.currency,
            amount: account.balance,
            created_at: now,
            updated_at: now,
        };

        // The partial unique index catches a concurrent duplicate the pre-check missed.
        let mut tx = self.repo.begin().await?;
        Repository::insert_withdrawal(&mut tx, &request).await?;
        Repository::insert_transaction(&mut tx, &transaction).await?;
        Repository::insert_notification(
            &mut tx,
            &NewNotification::for_admins(
                "new_withdrawal",
                request.id,
                "New withdrawal request",
                format!(
                    "Withdrawal requested for {} (recorded balance {})",
                    account.account_name,
                    format_amount(account.balance, account.currency)
                ),
            ),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(request_id = %request.id, ad_account_id = %ad_account_id, "withdrawal created");
        self.email_admins(
            "new_withdrawal",
            json!({ "request_id": request.id, "ad_account_id": ad_account_id }),
        );
        Ok(request)
    }

    /// Admin moves a withdrawal along. Approval and completion need a verified
    /// amount, either in `update` or stored from an earlier step.
    ///
    /// Completion sets the account balance to exactly zero, whatever it was, and
    /// credits the verified amount to `withdrawal_wallet_<currency>`.
    pub async fn update_withdrawal_status(
        &self,
        request_id: Uuid,
        to: WithdrawalStatus,
        mut update: WithdrawalUpdate,
    ) -> Result<WithdrawalRequest, FundingError> {
        let request = self.load_withdrawal(request_id).await?;
        let from = request.status;
        ensure_transition(from, to)?;

        if let Some(amount) = update.verified_amount {
            if amount.is_negative() {
                return Err(FundingError::NegativeAmount(amount));
            }
            amount.to_storage()?;
            update.verified_amount = Some(amount.round2());
        }
        let verified_amount = update.verified_amount.or(request.verified_amount);
        let verified_amount = match to {
            WithdrawalStatus::Approved | WithdrawalStatus::Completed => {
                Some(verified_amount.ok_or_else(|| {
                    FundingError::validation(
                        "verified_amount",
                        format!("required to mark a withdrawal {}", to),
                    )
                })?)
            }
            _ => verified_amount,
        };

        let account = self
            .repo
            .get_ad_account(request.ad_account_id)
            .await?
            .ok_or_else(|| FundingError::not_found("ad account", request.ad_account_id))?;
        let now = TimeMs::now();

        let mut tx = self
            .begin_transition(TABLE, request_id, from, to, now)
            .await?;
        Repository::apply_withdrawal_update(&mut tx, request_id, &update).await?;

        if to == WithdrawalStatus::Completed {
            let amount = verified_amount.unwrap_or_default();
            let ledger = Ledger::new(Some(request_id), now);
            let removed = ledger.reset_to_zero(&mut tx, request.ad_account_id).await?;
            if amount.is_positive() {
                ledger
                    .credit(
                        &mut tx,
                        BalanceTarget::Wallet {
                            user_id: request.user_id,
                            bucket: WalletBucket::withdrawal(request.currency),
                        },
                        amount,
                    )
                    .await?;
            }
            info!(
                request_id = %request_id,
                removed = %removed,
                credited = %amount,
                "ad account emptied into withdrawal wallet"
            );
        }

        let shown = verified_amount.unwrap_or(account.balance);
        let mut change = TransactionChange::describe(describe(&account, shown));
        if let Some(amount) = verified_amount {
            change = change.with_amount(amount);
        }
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            change,
            NewNotification::for_client(
                request.user_id,
                format!("withdrawal_{}", to),
                request_id,
                format!("Withdrawal {}", to),
                format!("Your withdrawal from {} is now {}", account.account_name, to),
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "withdrawal_status",
            json!({ "request_id": request_id, "status": to, "verified_amount": verified_amount }),
        );
        self.load_withdrawal(request_id).await
    }

    pub async fn get_withdrawal(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<WithdrawalRequest, FundingError> {
        self.repo
            .get_withdrawal(request_id)
            .await?
            .filter(|r| caller.can_see(r.user_id))
            .ok_or_else(|| FundingError::not_found("withdrawal", request_id))
    }

    pub async fn list_withdrawals(
        &self,
        caller: Caller,
    ) -> Result<Vec<WithdrawalRequest>, FundingError> {
        self.repo.list_withdrawals(caller.scope()).await
    }

    async fn load_withdrawal(&self, request_id: Uuid) -> Result<WithdrawalRequest, FundingError> {
        self.repo
            .get_withdrawal(request_id)
            .await?
            .ok_or_else(|| FundingError::not_found("withdrawal", request_id))
    }
}

fn describe(account: &AdAccount, amount: Money) -> String {
    format!(
        "Withdrawal {} from {}",
        format_amount(amount, account.currency),
        account.account_name
    )
}
