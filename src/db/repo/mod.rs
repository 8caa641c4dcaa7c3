//! Repository layer for database operations.
//!
//! `Repository` is the injectable store shared by the funding service and the
//! scheduler. Methods are organized across submodules by domain:
//! - `ledger.rs` - balance mutations and the audit trail
//! - `requests.rs` - account, top-up, withdrawal and transfer requests
//! - `transactions.rs` - the per-request transaction log and its queries
//! - `notifications.rs` - deduplicated notifications

mod ledger;
mod notifications;
mod requests;
mod transactions;

pub use ledger::{BalanceTarget, Ledger, LedgerEntry};

use crate::domain::{
    AdAccount, AdAccountStatus, Money, Role, TimeMs, User, WalletBalances,
};
use crate::error::FundingError;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};
use std::str::FromStr;
use uuid::Uuid;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a database transaction. The first statement run on it should be a write.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, FundingError> {
        Ok(self.pool.begin().await?)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user with all wallets at zero.
    pub async fn insert_user(&self, user: &User) -> Result<(), FundingError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.created_at.as_ms())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if crate::error::is_unique_violation(&e) => Err(FundingError::validation(
                "email",
                format!("{} is already registered", user.email),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, FundingError> {
        let row = sqlx::query("SELECT id, email, name, role, created_at FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| user_from_row(&r)).transpose().map_err(Into::into)
    }

    pub async fn get_wallet_balances(
        &self,
        user_id: Uuid,
    ) -> Result<Option<WalletBalances>, FundingError> {
        let row = sqlx::query(
            r#"
            SELECT main_wallet_idr, main_wallet_usd, withdrawal_wallet_idr, withdrawal_wallet_usd
            FROM users WHERE id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| WalletBalances {
            main_idr: Money::from_storage(r.get("main_wallet_idr")),
            main_usd: Money::from_storage(r.get("main_wallet_usd")),
            withdrawal_idr: Money::from_storage(r.get("withdrawal_wallet_idr")),
            withdrawal_usd: Money::from_storage(r.get("withdrawal_wallet_usd")),
        }))
    }

    // =========================================================================
    // Ad accounts
    // =========================================================================

    pub async fn insert_ad_account(
        conn: &mut SqliteConnection,
        account: &AdAccount,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            INSERT INTO ad_accounts (
                id, user_id, request_id, platform, account_name, external_account_id,
                balance, status, fee_percentage, currency, last_topup_date, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.user_id.to_string())
        .bind(account.request_id.map(|id| id.to_string()))
        .bind(account.platform.as_str())
        .bind(&account.account_name)
        .bind(account.external_account_id.as_deref())
        .bind(account.balance.to_storage()?)
        .bind(account.status.as_str())
        .bind(account.fee_percentage.to_storage()?)
        .bind(account.currency.as_str())
        .bind(account.last_topup_date.map(|t| t.as_ms()))
        .bind(account.created_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get_ad_account(&self, id: Uuid) -> Result<Option<AdAccount>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", AD_ACCOUNT_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| ad_account_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    /// Accounts owned by `user_id`, or every account when `None`. Newest first.
    pub async fn list_ad_accounts(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<AdAccount>, FundingError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "{} WHERE user_id = ? ORDER BY created_at DESC",
                    AD_ACCOUNT_SELECT
                ))
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY created_at DESC", AD_ACCOUNT_SELECT))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(ad_account_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Ad account created from the given account request, if any.
    pub async fn ad_account_for_request(
        conn: &mut SqliteConnection,
        request_id: Uuid,
    ) -> Result<Option<Uuid>, FundingError> {
        let row = sqlx::query("SELECT id FROM ad_accounts WHERE request_id = ?")
            .bind(request_id.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| parse_uuid(&r, "id"))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn set_ad_account_status(
        conn: &mut SqliteConnection,
        id: Uuid,
        status: AdAccountStatus,
    ) -> Result<(), FundingError> {
        sqlx::query("UPDATE ad_accounts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

const AD_ACCOUNT_SELECT: &str = r#"
    SELECT id, user_id, request_id, platform, account_name, external_account_id,
           balance, status, fee_percentage, currency, last_topup_date, created_at
    FROM ad_accounts
"#;

// =============================================================================
// Row helpers
// =============================================================================

fn decode_err<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

pub(crate) fn parse_uuid(row: &SqliteRow, col: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    Uuid::parse_str(&raw).map_err(decode_err)
}

pub(crate) fn parse_opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(decode_err))
        .transpose()
}

pub(crate) fn parse_enum<T>(row: &SqliteRow, col: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(col)?;
    T::from_str(&raw).map_err(decode_err)
}

pub(crate) fn money(row: &SqliteRow, col: &str) -> Result<Money, sqlx::Error> {
    let cents: i64 = row.try_get(col)?;
    Ok(Money::from_storage(cents))
}

pub(crate) fn opt_money(row: &SqliteRow, col: &str) -> Result<Option<Money>, sqlx::Error> {
    let cents: Option<i64> = row.try_get(col)?;
    Ok(cents.map(Money::from_storage))
}

pub(crate) fn time(row: &SqliteRow, col: &str) -> Result<TimeMs, sqlx::Error> {
    let ms: i64 = row.try_get(col)?;
    Ok(TimeMs::new(ms))
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: parse_uuid(row, "id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: parse_enum::<Role>(row, "role")?,
        created_at: time(row, "created_at")?,
    })
}

fn ad_account_from_row(row: &SqliteRow) -> Result<AdAccount, sqlx::Error> {
    let last_topup: Option<i64> = row.try_get("last_topup_date")?;
    Ok(AdAccount {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        request_id: parse_opt_uuid(row, "request_id")?,
        platform: parse_enum(row, "platform")?,
        account_name: row.try_get("account_name")?,
        external_account_id: row.try_get("external_account_id")?,
        balance: money(row, "balance")?,
        status: parse_enum(row, "status")?,
        fee_percentage: money(row, "fee_percentage")?,
        currency: parse_enum(row, "currency")?,
        last_topup_date: last_topup.map(TimeMs::new),
        created_at: time(row, "created_at")?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{Currency, Platform};
    use tempfile::TempDir;

    pub async fn repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo.db").to_string_lossy().to_string();
        let pool = init_db(&path).await.unwrap();
        (dir, Repository::new(pool))
    }

    pub async fn user(repo: &Repository) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("{}@example.com", id.simple()),
            name: "Test Client".to_string(),
            role: Role::Client,
            created_at: TimeMs::new(1_700_000_000_000),
        };
        repo.insert_user(&user).await.unwrap();
        user
    }

    pub async fn ad_account(repo: &Repository, user_id: Uuid, currency: Currency) -> AdAccount {
        let account = AdAccount {
            id: Uuid::new_v4(),
            user_id,
            request_id: None,
            platform: Platform::Google,
            account_name: "Spring Sale".to_string(),
            external_account_id: None,
            balance: Money::zero(),
            status: AdAccountStatus::Active,
            fee_percentage: Money::from_units(3),
            currency,
            last_topup_date: None,
            created_at: TimeMs::new(1_700_000_000_000),
        };
        let mut conn = repo.pool().acquire().await.unwrap();
        Repository::insert_ad_account(&mut conn, &account)
            .await
            .unwrap();
        account
    }
}
