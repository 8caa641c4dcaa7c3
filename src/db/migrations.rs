//! SQLite setup for the funding store.
//!
//! Two uniqueness rules are enforced by the schema itself rather than by callers:
//! `notifications(reference_id, type)` keeps at most one notification per event, and
//! the partial index on `withdrawal_requests(ad_account_id)` admits only one
//! pending/processing/approved withdrawal per ad account.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// Open the funding database at `db_path`, creating the file and its directory,
/// and bring the schema up to date. Every pooled connection gets the same pragmas.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { configure_pragmas(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    run_migrations(&pool).await?;

    info!(path = %db_path, "database ready");
    Ok(pool)
}

/// Create the user, account, request, transaction, ledger-entry and notification
/// tables with their indexes. Safe on an existing database.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let schema_sql = include_str!("schema.sql");

    let mut applied = 0usize;
    for statement in schema_sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
            applied += 1;
        }
    }

    debug!(statements = applied, "schema applied");
    Ok(())
}

/// Foreign keys on; WAL so sweeps can read while a transition holds the write lock;
/// a busy timeout so competing transitions queue instead of failing immediately.
async fn configure_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!(%journal_mode, "sqlite connection configured");

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_pool() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("funding.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (temp_dir, pool)
    }

    #[tokio::test]
    async fn test_schema_creates_all_tables() {
        let (_dir, pool) = fresh_pool().await;

        for table in [
            "users",
            "ad_accounts",
            "account_requests",
            "topup_requests",
            "wallet_topup_requests",
            "withdrawal_requests",
            "transfer_requests",
            "transactions",
            "ledger_entries",
            "notifications",
        ] {
            let found: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(found.0, 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let (_dir, pool) = fresh_pool().await;
        run_migrations(&pool)
            .await
            .expect("second migration run failed");
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let (_dir, pool) = fresh_pool().await;
        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_notification_key_is_unique() {
        let (_dir, pool) = fresh_pool().await;
        let insert = |id: &'static str| {
            sqlx::query(
                "INSERT INTO notifications (id, audience, title, message, type, reference_id, created_at)
                 VALUES (?, 'admin', 't', 'm', 'new_transfer', 'r1', 0)",
            )
            .bind(id)
        };
        insert("n1").execute(&pool).await.unwrap();
        let err = insert("n2").execute(&pool).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_balance_check_constraint_rejects_negative() {
        let (_dir, pool) = fresh_pool().await;
        let err = sqlx::query(
            "INSERT INTO users (id, email, name, role, main_wallet_idr, created_at)
             VALUES ('u1', 'a@example.com', 'A', 'client', -1, 0)",
        )
        .execute(&pool)
        .await;
        assert!(err.is_err());
    }
}
