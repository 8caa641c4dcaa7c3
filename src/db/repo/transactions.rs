//! Transaction log: one row per request, kept in step with the request's status.

use super::{money, parse_enum, parse_uuid, time, Repository};
use crate::domain::{
    Currency, Money, TimeMs, Transaction, TransactionQuery, TransactionStatus, TransactionSummary,
    TransactionType,
};
use crate::error::FundingError;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

impl Repository {
    pub async fn insert_transaction(
        conn: &mut SqliteConnection,
        tx: &Transaction,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, request_id, type, status, description, currency, amount,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.user_id.to_string())
        .bind(tx.request_id.to_string())
        .bind(tx.tx_type.as_str())
        .bind(tx.status.as_str())
        .bind(&tx.description)
        .bind(tx.currency.as_str())
        .bind(tx.amount.to_storage()?)
        .bind(tx.created_at.as_ms())
        .bind(tx.updated_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Write the mapped status and the regenerated description onto a request's
    /// transaction row. `amount` replaces the stored amount when given.
    pub async fn sync_transaction(
        conn: &mut SqliteConnection,
        request_id: Uuid,
        status: TransactionStatus,
        description: &str,
        amount: Option<Money>,
        now: TimeMs,
    ) -> Result<(), FundingError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, description = ?, amount = COALESCE(?, amount), updated_at = ?
            WHERE request_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(description)
        .bind(amount.map(|m| m.to_storage()).transpose()?)
        .bind(now.as_ms())
        .bind(request_id.to_string())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(FundingError::not_found("transaction for request", request_id));
        }
        Ok(())
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", TRANSACTION_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| transaction_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn get_transaction_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Option<Transaction>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE request_id = ?", TRANSACTION_SELECT))
            .bind(request_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| transaction_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    /// Transactions matching `query`, newest first. Date bounds are inclusive.
    /// `user_id = None` lists every user's transactions.
    pub async fn list_transactions(
        &self,
        user_id: Option<Uuid>,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, FundingError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(TRANSACTION_SELECT);
        push_filters(&mut builder, user_id, query);
        builder.push(" ORDER BY created_at DESC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Count and total per (type, status, currency) over the matching transactions.
    pub async fn summarize_transactions(
        &self,
        user_id: Option<Uuid>,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionSummary>, FundingError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT type, status, currency, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total \
             FROM transactions",
        );
        push_filters(&mut builder, user_id, query);
        builder.push(" GROUP BY type, status, currency ORDER BY type, status, currency");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(TransactionSummary {
                    tx_type: parse_enum::<TransactionType>(row, "type")?,
                    status: parse_enum::<TransactionStatus>(row, "status")?,
                    currency: parse_enum::<Currency>(row, "currency")?,
                    count: row.try_get("count")?,
                    total_amount: money(row, "total")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }
}

const TRANSACTION_SELECT: &str = r#"
    SELECT id, user_id, request_id, type, status, description, currency, amount,
           created_at, updated_at
    FROM transactions
"#;

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    user_id: Option<Uuid>,
    query: &TransactionQuery,
) {
    builder.push(" WHERE 1 = 1");
    if let Some(user_id) = user_id {
        builder.push(" AND user_id = ").push_bind(user_id.to_string());
    }
    if let Some(tx_type) = query.tx_type {
        builder.push(" AND type = ").push_bind(tx_type.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.from {
        builder.push(" AND created_at >= ").push_bind(from.as_ms());
    }
    if let Some(to) = query.to {
        builder.push(" AND created_at <= ").push_bind(to.as_ms());
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        request_id: parse_uuid(row, "request_id")?,
        tx_type: parse_enum(row, "type")?,
        status: parse_enum(row, "status")?,
        description: row.try_get("description")?,
        currency: parse_enum(row, "currency")?,
        amount: money(row, "amount")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}
