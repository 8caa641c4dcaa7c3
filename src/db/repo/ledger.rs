//! Balance mutations. Nothing else writes wallet or ad-account balances.
//!
//! Every function runs on a caller-supplied connection, normally inside the
//! caller's database transaction, so a multi-leg movement either commits whole or
//! not at all. Each successful mutation appends one `ledger_entries` row.

use super::{money, parse_opt_uuid, time, Repository};
use crate::domain::{Money, TimeMs, WalletBucket};
use crate::error::FundingError;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// A balance the ledger can move money into or out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceTarget {
    Wallet { user_id: Uuid, bucket: WalletBucket },
    AdAccount { id: Uuid },
}

impl BalanceTarget {
    fn kind(&self) -> &'static str {
        match self {
            BalanceTarget::Wallet { .. } => "wallet",
            BalanceTarget::AdAccount { .. } => "ad_account",
        }
    }

    fn id(&self) -> Uuid {
        match self {
            BalanceTarget::Wallet { user_id, .. } => *user_id,
            BalanceTarget::AdAccount { id } => *id,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            BalanceTarget::Wallet { .. } => "users",
            BalanceTarget::AdAccount { .. } => "ad_accounts",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            BalanceTarget::Wallet { bucket, .. } => bucket.column(),
            BalanceTarget::AdAccount { .. } => "balance",
        }
    }

    fn mirror_column(&self) -> Option<&'static str> {
        match self {
            BalanceTarget::Wallet { bucket, .. } => bucket.legacy_mirror_column(),
            BalanceTarget::AdAccount { .. } => None,
        }
    }

    fn entity(&self) -> &'static str {
        match self {
            BalanceTarget::Wallet { .. } => "user",
            BalanceTarget::AdAccount { .. } => "ad account",
        }
    }
}

impl fmt::Display for BalanceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceTarget::Wallet { user_id, bucket } => write!(f, "{} of user {}", bucket, user_id),
            BalanceTarget::AdAccount { id } => write!(f, "ad account {}", id),
        }
    }
}

/// One row of the balance audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub target_kind: String,
    pub target_id: String,
    pub bucket: String,
    pub delta: Money,
    pub balance_after: Money,
    pub request_id: Option<Uuid>,
    pub created_at: TimeMs,
}

/// Ledger operations attributed to one request at one instant.
#[derive(Debug, Clone, Copy)]
pub struct Ledger {
    request_id: Option<Uuid>,
    at: TimeMs,
}

impl Ledger {
    pub fn new(request_id: Option<Uuid>, at: TimeMs) -> Self {
        Self { request_id, at }
    }

    /// Increase a balance. Returns the new balance.
    pub async fn credit(
        &self,
        conn: &mut SqliteConnection,
        target: BalanceTarget,
        amount: Money,
    ) -> Result<Money, FundingError> {
        let cents = non_negative_cents(amount)?;
        let after = self.apply_credit(conn, target, cents, false).await?;
        self.record(conn, target, cents, after).await?;
        Ok(Money::from_storage(after))
    }

    /// Credit an ad account from a verified top-up or approved transfer, stamping
    /// `last_topup_date`.
    pub async fn credit_topup(
        &self,
        conn: &mut SqliteConnection,
        ad_account_id: Uuid,
        amount: Money,
    ) -> Result<Money, FundingError> {
        let target = BalanceTarget::AdAccount { id: ad_account_id };
        let cents = non_negative_cents(amount)?;
        let after = self.apply_credit(conn, target, cents, true).await?;
        self.record(conn, target, cents, after).await?;
        Ok(Money::from_storage(after))
    }

    /// Decrease a balance, failing without effect if it would go negative.
    pub async fn debit(
        &self,
        conn: &mut SqliteConnection,
        target: BalanceTarget,
        amount: Money,
    ) -> Result<Money, FundingError> {
        let cents = non_negative_cents(amount)?;
        let column = target.column();
        let mirror = target
            .mirror_column()
            .map(|m| format!(", {m} = {column} - ?"))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE {table} SET {column} = {column} - ?{mirror} \
             WHERE id = ? AND {column} >= ? RETURNING {column}",
            table = target.table(),
        );

        let mut query = sqlx::query(&sql).bind(cents);
        if target.mirror_column().is_some() {
            query = query.bind(cents);
        }
        let row = query
            .bind(target.id().to_string())
            .bind(cents)
            .fetch_optional(&mut *conn)
            .await?;

        let after: i64 = match row {
            Some(row) => row.get(0),
            None => {
                let available = Self::current_balance(conn, target).await?;
                return Err(FundingError::InsufficientBalance {
                    target: target.to_string(),
                    available,
                    required: Money::from_storage(cents),
                });
            }
        };

        self.record(conn, target, -cents, after).await?;
        Ok(Money::from_storage(after))
    }

    /// Debit `amount + fee` from `from` and credit `amount` to `to`. An ad account
    /// receiving funds gets its `last_topup_date` stamped like a verified top-up.
    ///
    /// Both legs run on `conn`; the caller's transaction makes them all-or-nothing.
    pub async fn transfer(
        &self,
        conn: &mut SqliteConnection,
        from: BalanceTarget,
        to: BalanceTarget,
        amount: Money,
        fee: Money,
    ) -> Result<(), FundingError> {
        if amount.is_negative() {
            return Err(FundingError::NegativeAmount(amount));
        }
        if fee.is_negative() {
            return Err(FundingError::NegativeAmount(fee));
        }
        self.debit(conn, from, amount + fee).await?;
        match to {
            BalanceTarget::AdAccount { id } => self.credit_topup(conn, id, amount).await?,
            _ => self.credit(conn, to, amount).await?,
        };
        Ok(())
    }

    /// Set an ad account balance to exactly zero. Returns the amount removed.
    ///
    /// Must run inside a write transaction so the read and the reset see the same row.
    pub async fn reset_to_zero(
        &self,
        conn: &mut SqliteConnection,
        ad_account_id: Uuid,
    ) -> Result<Money, FundingError> {
        let target = BalanceTarget::AdAccount { id: ad_account_id };
        let previous = Self::current_balance(conn, target).await?.to_storage()?;

        sqlx::query("UPDATE ad_accounts SET balance = 0 WHERE id = ?")
            .bind(ad_account_id.to_string())
            .execute(&mut *conn)
            .await?;

        self.record(conn, target, -previous, 0).await?;
        Ok(Money::from_storage(previous))
    }

    async fn apply_credit(
        &self,
        conn: &mut SqliteConnection,
        target: BalanceTarget,
        cents: i64,
        stamp_topup_date: bool,
    ) -> Result<i64, FundingError> {
        let column = target.column();
        let mirror = target
            .mirror_column()
            .map(|m| format!(", {m} = {column} + ?"))
            .unwrap_or_default();
        let stamp = if stamp_topup_date {
            ", last_topup_date = ?"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE {table} SET {column} = {column} + ?{mirror}{stamp} \
             WHERE id = ? RETURNING {column}",
            table = target.table(),
        );

        let mut query = sqlx::query(&sql).bind(cents);
        if target.mirror_column().is_some() {
            query = query.bind(cents);
        }
        if stamp_topup_date {
            query = query.bind(self.at.as_ms());
        }
        let row = query
            .bind(target.id().to_string())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| FundingError::not_found(target.entity(), target.id()))?;

        Ok(row.get(0))
    }

    async fn current_balance(
        conn: &mut SqliteConnection,
        target: BalanceTarget,
    ) -> Result<Money, FundingError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            target.column(),
            target.table()
        );
        let row = sqlx::query(&sql)
            .bind(target.id().to_string())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| FundingError::not_found(target.entity(), target.id()))?;
        Ok(Money::from_storage(row.get(0)))
    }

    async fn record(
        &self,
        conn: &mut SqliteConnection,
        target: BalanceTarget,
        delta: i64,
        balance_after: i64,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                target_kind, target_id, bucket, delta, balance_after, request_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(target.kind())
        .bind(target.id().to_string())
        .bind(target.column())
        .bind(delta)
        .bind(balance_after)
        .bind(self.request_id.map(|id| id.to_string()))
        .bind(self.at.as_ms())
        .execute(&mut *conn)
        .await?;

        debug!(target = %target, delta, balance_after, "ledger entry recorded");
        Ok(())
    }
}

fn non_negative_cents(amount: Money) -> Result<i64, FundingError> {
    if amount.is_negative() {
        return Err(FundingError::NegativeAmount(amount));
    }
    Ok(amount.round2().to_storage()?)
}

impl Repository {
    /// Audit trail for one balance, oldest first.
    pub async fn ledger_entries(
        &self,
        target: BalanceTarget,
    ) -> Result<Vec<LedgerEntry>, FundingError> {
        let rows = sqlx::query(
            r#"
            SELECT id, target_kind, target_id, bucket, delta, balance_after, request_id, created_at
            FROM ledger_entries
            WHERE target_kind = ? AND target_id = ? AND bucket = ?
            ORDER BY id ASC
            "#,
        )
        .bind(target.kind())
        .bind(target.id().to_string())
        .bind(target.column())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        target_kind: row.try_get("target_kind")?,
        target_id: row.try_get("target_id")?,
        bucket: row.try_get("bucket")?,
        delta: money(row, "delta")?,
        balance_after: money(row, "balance_after")?,
        request_id: parse_opt_uuid(row, "request_id")?,
        created_at: time(row, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::Currency;

    fn ledger() -> Ledger {
        Ledger::new(None, TimeMs::new(1_700_000_100_000))
    }

    fn main_idr(user_id: Uuid) -> BalanceTarget {
        BalanceTarget::Wallet {
            user_id,
            bucket: WalletBucket::main(Currency::Idr),
        }
    }

    #[tokio::test]
    async fn test_credit_updates_balance_mirror_and_audit() {
        let (_dir, repo) = repo().await;
        let user = user(&repo).await;
        let mut conn = repo.pool().acquire().await.unwrap();

        let after = ledger()
            .credit(&mut conn, main_idr(user.id), "1000.50".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(after, "1000.50".parse().unwrap());

        let (main, mirror): (i64, i64) = sqlx::query_as(
            "SELECT main_wallet_idr, wallet_balance_idr FROM users WHERE id = ?",
        )
        .bind(user.id.to_string())
        .fetch_one(repo.pool())
        .await
        .unwrap();
        assert_eq!((main, mirror), (100_050, 100_050));

        let entries = repo.ledger_entries(main_idr(user.id)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].delta, "1000.50".parse().unwrap());
    }

    #[tokio::test]
    async fn test_negative_credit_rejected() {
        let (_dir, repo) = repo().await;
        let user = user(&repo).await;
        let mut conn = repo.pool().acquire().await.unwrap();

        let err = ledger()
            .credit(&mut conn, main_idr(user.id), Money::from_units(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::NegativeAmount(_)));
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() {
        let (_dir, repo) = repo().await;
        let user = user(&repo).await;
        let mut conn = repo.pool().acquire().await.unwrap();
        let l = ledger();

        l.credit(&mut conn, main_idr(user.id), Money::from_units(1000))
            .await
            .unwrap();
        let err = l
            .debit(&mut conn, main_idr(user.id), Money::from_units(1001))
            .await
            .unwrap_err();
        match err {
            FundingError::InsufficientBalance {
                available,
                required,
                ..
            } => {
                assert_eq!(available, Money::from_units(1000));
                assert_eq!(required, Money::from_units(1001));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let left = l
            .debit(&mut conn, main_idr(user.id), Money::from_units(1000))
            .await
            .unwrap();
        assert!(left.is_zero());
        let wallets = repo.get_wallet_balances(user.id).await.unwrap().unwrap();
        assert!(wallets.main_idr.is_zero());

        // credit + successful debit; the failed debit left no entry
        assert_eq!(repo.ledger_entries(main_idr(user.id)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_is_all_or_nothing() {
        let (_dir, repo) = repo().await;
        let user = user(&repo).await;
        let account = ad_account(&repo, user.id, Currency::Idr).await;
        let target = BalanceTarget::AdAccount { id: account.id };
        let l = ledger();

        {
            let mut conn = repo.pool().acquire().await.unwrap();
            l.credit(&mut conn, main_idr(user.id), Money::from_units(1000))
                .await
                .unwrap();
        }

        let mut tx = repo.begin().await.unwrap();
        let err = l
            .transfer(
                &mut tx,
                main_idr(user.id),
                target,
                Money::from_units(990),
                Money::from_units(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::InsufficientBalance { .. }));
        drop(tx);

        let mut tx = repo.begin().await.unwrap();
        l.transfer(
            &mut tx,
            main_idr(user.id),
            target,
            Money::from_units(970),
            Money::from_units(30),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let wallets = repo.get_wallet_balances(user.id).await.unwrap().unwrap();
        assert!(wallets.main_idr.is_zero());
        let account = repo.get_ad_account(account.id).await.unwrap().unwrap();
        assert_eq!(account.balance, Money::from_units(970));
        assert!(!account.has_topup_date_gap());
    }

    #[tokio::test]
    async fn test_credit_topup_stamps_date_and_reset_zeroes() {
        let (_dir, repo) = repo().await;
        let user = user(&repo).await;
        let account = ad_account(&repo, user.id, Currency::Usd).await;
        let l = ledger();

        let mut tx = repo.begin().await.unwrap();
        l.credit_topup(&mut tx, account.id, "250.25".parse().unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let loaded = repo.get_ad_account(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_topup_date, Some(TimeMs::new(1_700_000_100_000)));
        assert!(!loaded.has_topup_date_gap());

        let mut tx = repo.begin().await.unwrap();
        let removed = l.reset_to_zero(&mut tx, account.id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(removed, "250.25".parse().unwrap());

        let loaded = repo.get_ad_account(account.id).await.unwrap().unwrap();
        assert!(loaded.balance.is_zero());
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let (_dir, repo) = repo().await;
        let mut conn = repo.pool().acquire().await.unwrap();
        let err = ledger()
            .credit(
                &mut conn,
                BalanceTarget::AdAccount { id: Uuid::new_v4() },
                Money::from_units(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::NotFound { .. }));
    }
}
