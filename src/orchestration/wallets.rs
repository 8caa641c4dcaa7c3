//! Users, wallet balances, currency conversion and transaction reporting.

use super::FundingService;
use crate::db::{BalanceTarget, Ledger};
use crate::domain::{
    Caller, Currency, Money, Role, TimeMs, Transaction, TransactionFilter, TransactionSummary,
    User, WalletBalances, WalletBucket,
};
use crate::engine::{convert, validate_amount};
use crate::error::FundingError;
use crate::external::InvoiceData;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Outcome of a main-wallet currency conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletConversion {
    pub id: Uuid,
    pub from: Currency,
    pub to: Currency,
    pub debited: Money,
    pub credited: Money,
    pub rate: Money,
    pub balances: WalletBalances,
}

impl FundingService {
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        role: Role,
    ) -> Result<User, FundingError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(FundingError::validation("email", "must be an email address"));
        }
        if name.trim().is_empty() {
            return Err(FundingError::validation("name", "must not be empty"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            name: name.trim().to_string(),
            role,
            created_at: TimeMs::now(),
        };
        self.repo.insert_user(&user).await?;
        info!(user_id = %user.id, role = role.as_str(), "user created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, FundingError> {
        self.repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| FundingError::not_found("user", user_id))
    }

    pub async fn get_wallet_balances(&self, user_id: Uuid) -> Result<WalletBalances, FundingError> {
        self.repo
            .get_wallet_balances(user_id)
            .await?
            .ok_or_else(|| FundingError::not_found("user", user_id))
    }

    /// Move `amount` out of `main_wallet_<from>` and the converted amount into
    /// `main_wallet_<to>`, both legs in one database transaction.
    pub async fn convert_wallet(
        &self,
        user_id: Uuid,
        from: Currency,
        to: Currency,
        amount: Money,
    ) -> Result<WalletConversion, FundingError> {
        let amount = validate_amount(amount)?;
        if from == to {
            return Err(FundingError::validation(
                "to",
                "target currency must differ from source currency",
            ));
        }
        self.get_user(user_id).await?;

        let raw_rate = self.rates.get_rate(from, to).await?;
        let rate = Money::from_f64(raw_rate)
            .map_err(|e| FundingError::validation("rate", e.to_string()))?;
        let credited = convert(amount, rate);
        if !credited.is_positive() {
            return Err(FundingError::validation(
                "amount",
                format!("{} {} converts to nothing at rate {}", amount, from, rate),
            ));
        }

        let id = Uuid::new_v4();
        let ledger = Ledger::new(Some(id), TimeMs::now());
        let mut tx = self.repo.begin().await?;
        ledger
            .debit(
                &mut tx,
                BalanceTarget::Wallet {
                    user_id,
                    bucket: WalletBucket::main(from),
                },
                amount,
            )
            .await?;
        ledger
            .credit(
                &mut tx,
                BalanceTarget::Wallet {
                    user_id,
                    bucket: WalletBucket::main(to),
                },
                credited,
            )
            .await?;
        tx.commit().await?;

        info!(user_id = %user_id, %from, %to, %amount, %credited, "wallet converted");
        Ok(WalletConversion {
            id,
            from,
            to,
            debited: amount,
            credited,
            rate,
            balances: self.get_wallet_balances(user_id).await?,
        })
    }

    /// Transactions visible to `caller`, filtered leniently.
    pub async fn list_transactions(
        &self,
        caller: Caller,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, FundingError> {
        self.repo
            .list_transactions(caller.scope(), &filter.resolve())
            .await
    }

    pub async fn get_transaction(
        &self,
        caller: Caller,
        transaction_id: Uuid,
    ) -> Result<Transaction, FundingError> {
        self.repo
            .get_transaction(transaction_id)
            .await?
            .filter(|t| caller.can_see(t.user_id))
            .ok_or_else(|| FundingError::not_found("transaction", transaction_id))
    }

    pub async fn summarize_transactions(
        &self,
        caller: Caller,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionSummary>, FundingError> {
        self.repo
            .summarize_transactions(caller.scope(), &filter.resolve())
            .await
    }

    /// PDF invoice for one transaction.
    pub async fn render_invoice(
        &self,
        caller: Caller,
        transaction_id: Uuid,
    ) -> Result<Vec<u8>, FundingError> {
        let transaction = self.get_transaction(caller, transaction_id).await?;
        let customer = self.get_user(transaction.user_id).await?;
        let invoice = InvoiceData::from_transaction(&transaction, &customer);
        Ok(self.renderer.render_invoice(&invoice)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::external::StaticRates;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_user_validates_input() {
        let (_dir, service) = service().await;
        let err = service
            .create_user("not-an-email", "X", Role::Client)
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Validation { field: "email", .. }));

        let user = service
            .create_user(" Ana@Example.com ", "Ana", Role::Admin)
            .await
            .unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(
            service.get_wallet_balances(user.id).await.unwrap(),
            WalletBalances::default()
        );
    }

    #[tokio::test]
    async fn test_convert_usd_to_idr() {
        let (_dir, service) = service().await;
        let service = service.with_rates(Arc::new(StaticRates::new(16_000.0)));
        let user = client(&service).await;
        fund(&service, main_wallet(user.id, Currency::Usd), Money::from_units(10)).await;

        let result = service
            .convert_wallet(user.id, Currency::Usd, Currency::Idr, "2.50".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(result.credited, Money::from_units(40_000));
        assert_eq!(result.balances.main_usd, "7.50".parse().unwrap());
        assert_eq!(result.balances.main_idr, Money::from_units(40_000));
    }

    #[tokio::test]
    async fn test_convert_insufficient_leaves_wallets_untouched() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        fund(&service, main_wallet(user.id, Currency::Idr), Money::from_units(1_000)).await;

        let err = service
            .convert_wallet(user.id, Currency::Idr, Currency::Usd, Money::from_units(20_000))
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::InsufficientBalance { .. }));
        let balances = service.get_wallet_balances(user.id).await.unwrap();
        assert_eq!(balances.main_idr, Money::from_units(1_000));
        assert!(balances.main_usd.is_zero());
    }

    #[tokio::test]
    async fn test_convert_same_currency_rejected() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let err = service
            .convert_wallet(user.id, Currency::Idr, Currency::Idr, Money::from_units(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Validation { field: "to", .. }));
    }
}
