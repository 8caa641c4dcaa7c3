//! Request persistence: account, top-up, withdrawal and transfer requests.

use super::{money, opt_money, parse_enum, parse_opt_uuid, parse_uuid, time, Repository};
use crate::domain::{
    AccountRequest, Money, PlatformDetails, TimeMs, TopUpKind, TopUpRequest, TopUpStatus,
    TransferRequest, WithdrawalRequest, WithdrawalStatus, WithdrawalUpdate,
};
use crate::error::{is_unique_violation, FundingError};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

impl Repository {
    // =========================================================================
    // Status compare-and-set
    // =========================================================================

    /// Move `table.id` from `from` to `to` only if it is still `from`.
    ///
    /// This is the first write of every transition transaction; zero rows means
    /// another caller got there first.
    pub async fn claim_status(
        conn: &mut SqliteConnection,
        table: &'static str,
        id: Uuid,
        from: &str,
        to: &str,
        now: TimeMs,
    ) -> Result<(), FundingError> {
        let sql = format!(
            "UPDATE {} SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            table
        );
        let result = sqlx::query(&sql)
            .bind(to)
            .bind(now.as_ms())
            .bind(id.to_string())
            .bind(from)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FundingError::StaleState(format!(
                "{} {} is no longer {}",
                table, id, from
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Account requests
    // =========================================================================

    pub async fn insert_account_request(
        conn: &mut SqliteConnection,
        request: &AccountRequest,
    ) -> Result<(), FundingError> {
        let details = serde_json::to_string(&request.details)
            .map_err(|e| FundingError::validation("details", e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO account_requests (
                id, user_id, platform, account_name, currency, details, status,
                fee_percentage, external_account_id, ad_account_id, admin_notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.user_id.to_string())
        .bind(request.platform().as_str())
        .bind(&request.account_name)
        .bind(request.currency.as_str())
        .bind(details)
        .bind(request.status.as_str())
        .bind(request.fee_percentage.map(|m| m.to_storage()).transpose()?)
        .bind(request.external_account_id.as_deref())
        .bind(request.ad_account_id.map(|id| id.to_string()))
        .bind(request.admin_notes.as_deref())
        .bind(request.created_at.as_ms())
        .bind(request.updated_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get_account_request(
        &self,
        id: Uuid,
    ) -> Result<Option<AccountRequest>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", ACCOUNT_REQUEST_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| account_request_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_account_requests(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<AccountRequest>, FundingError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "{} WHERE user_id = ? ORDER BY created_at DESC",
                    ACCOUNT_REQUEST_SELECT
                ))
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{} ORDER BY created_at DESC",
                    ACCOUNT_REQUEST_SELECT
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter()
            .map(account_request_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Persist the admin-supplied fields of an account decision. `None` keeps the stored value.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_account_decision(
        conn: &mut SqliteConnection,
        id: Uuid,
        account_name: Option<&str>,
        fee_percentage: Option<Money>,
        external_account_id: Option<&str>,
        ad_account_id: Option<Uuid>,
        admin_notes: Option<&str>,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            UPDATE account_requests SET
                account_name = COALESCE(?, account_name),
                fee_percentage = COALESCE(?, fee_percentage),
                external_account_id = COALESCE(?, external_account_id),
                ad_account_id = COALESCE(?, ad_account_id),
                admin_notes = COALESCE(?, admin_notes)
            WHERE id = ?
            "#,
        )
        .bind(account_name)
        .bind(fee_percentage.map(|m| m.to_storage()).transpose()?)
        .bind(external_account_id)
        .bind(ad_account_id.map(|id| id.to_string()))
        .bind(admin_notes)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Top-up requests
    // =========================================================================

    pub async fn insert_topup(
        conn: &mut SqliteConnection,
        request: &TopUpRequest,
    ) -> Result<(), FundingError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                id, user_id, ad_account_id, amount, currency, unique_code,
                total_with_unique_code, payment_method, payment_proof, status,
                admin_id, admin_notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            request.kind.table()
        );
        sqlx::query(&sql)
            .bind(request.id.to_string())
            .bind(request.user_id.to_string())
            .bind(request.ad_account_id.map(|id| id.to_string()))
            .bind(request.amount.to_storage()?)
            .bind(request.currency.as_str())
            .bind(request.unique_code.to_storage()?)
            .bind(request.total_with_unique_code.to_storage()?)
            .bind(&request.payment_method)
            .bind(request.payment_proof.as_deref())
            .bind(request.status.as_str())
            .bind(request.admin_id.map(|id| id.to_string()))
            .bind(request.admin_notes.as_deref())
            .bind(request.created_at.as_ms())
            .bind(request.updated_at.as_ms())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_topup(
        &self,
        kind: TopUpKind,
        id: Uuid,
    ) -> Result<Option<TopUpRequest>, FundingError> {
        let sql = format!("{} FROM {} WHERE id = ?", TOPUP_COLUMNS, kind.table());
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| topup_from_row(&r, kind))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_topups(
        &self,
        kind: TopUpKind,
        user_id: Option<Uuid>,
    ) -> Result<Vec<TopUpRequest>, FundingError> {
        let rows = match user_id {
            Some(user_id) => {
                let sql = format!(
                    "{} FROM {} WHERE user_id = ? ORDER BY created_at DESC",
                    TOPUP_COLUMNS,
                    kind.table()
                );
                sqlx::query(&sql)
                    .bind(user_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "{} FROM {} ORDER BY created_at DESC",
                    TOPUP_COLUMNS,
                    kind.table()
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };
        rows.iter()
            .map(|r| topup_from_row(r, kind))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Top-ups still awaiting payment that were created at or before `cutoff`.
    pub async fn expired_topups(
        &self,
        kind: TopUpKind,
        cutoff: TimeMs,
    ) -> Result<Vec<TopUpRequest>, FundingError> {
        let sql = format!(
            "{} FROM {} WHERE status IN (?, ?) AND created_at <= ? ORDER BY created_at ASC",
            TOPUP_COLUMNS,
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(TopUpStatus::Pending.as_str())
            .bind(TopUpStatus::ProofUploaded.as_str())
            .bind(cutoff.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| topup_from_row(r, kind))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Set the proof reference. Runs after the status claim inside the same transaction.
    pub async fn set_topup_proof(
        conn: &mut SqliteConnection,
        kind: TopUpKind,
        id: Uuid,
        proof_ref: &str,
    ) -> Result<(), FundingError> {
        let sql = format!("UPDATE {} SET payment_proof = ? WHERE id = ?", kind.table());
        sqlx::query(&sql)
            .bind(proof_ref)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Swap the proof of a request that is still `proof_uploaded` and still holds
    /// `expected_proof`, so two racing re-uploads cannot both win.
    pub async fn replace_topup_proof(
        conn: &mut SqliteConnection,
        kind: TopUpKind,
        id: Uuid,
        expected_proof: Option<&str>,
        proof_ref: &str,
        now: TimeMs,
    ) -> Result<(), FundingError> {
        let sql = format!(
            "UPDATE {} SET payment_proof = ?, updated_at = ? \
             WHERE id = ? AND status = ? AND payment_proof IS ?",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(proof_ref)
            .bind(now.as_ms())
            .bind(id.to_string())
            .bind(TopUpStatus::ProofUploaded.as_str())
            .bind(expected_proof)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FundingError::StaleState(format!(
                "{} {} changed while its proof was being replaced",
                kind.table(),
                id
            )));
        }
        Ok(())
    }

    pub async fn record_topup_decision(
        conn: &mut SqliteConnection,
        kind: TopUpKind,
        id: Uuid,
        admin_id: Option<Uuid>,
        admin_notes: Option<&str>,
    ) -> Result<(), FundingError> {
        let sql = format!(
            "UPDATE {} SET admin_id = COALESCE(?, admin_id), \
             admin_notes = COALESCE(?, admin_notes) WHERE id = ?",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(admin_id.map(|id| id.to_string()))
            .bind(admin_notes)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Withdrawal requests
    // =========================================================================

    /// Insert a withdrawal. The partial unique index on unresolved withdrawals
    /// turns a concurrent duplicate into `DuplicateUnresolvedWithdrawal`.
    pub async fn insert_withdrawal(
        conn: &mut SqliteConnection,
        request: &WithdrawalRequest,
    ) -> Result<(), FundingError> {
        let result = sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (
                id, user_id, ad_account_id, currency, status, verified_amount,
                actual_balance_proof_url, after_withdrawal_proof_url, admin_notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.user_id.to_string())
        .bind(request.ad_account_id.to_string())
        .bind(request.currency.as_str())
        .bind(request.status.as_str())
        .bind(request.verified_amount.map(|m| m.to_storage()).transpose()?)
        .bind(request.actual_balance_proof_url.as_deref())
        .bind(request.after_withdrawal_proof_url.as_deref())
        .bind(request.admin_notes.as_deref())
        .bind(request.created_at.as_ms())
        .bind(request.updated_at.as_ms())
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(FundingError::DuplicateUnresolvedWithdrawal {
                ad_account_id: request.ad_account_id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_withdrawal(
        &self,
        id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", WITHDRAWAL_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| withdrawal_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_withdrawals(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<WithdrawalRequest>, FundingError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "{} WHERE user_id = ? ORDER BY created_at DESC",
                    WITHDRAWAL_SELECT
                ))
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY created_at DESC", WITHDRAWAL_SELECT))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(withdrawal_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Id of the account's unresolved withdrawal, if one exists.
    pub async fn find_unresolved_withdrawal(
        &self,
        ad_account_id: Uuid,
    ) -> Result<Option<Uuid>, FundingError> {
        let row = sqlx::query(
            r#"
            SELECT id FROM withdrawal_requests
            WHERE ad_account_id = ? AND status IN (?, ?, ?)
            LIMIT 1
            "#,
        )
        .bind(ad_account_id.to_string())
        .bind(WithdrawalStatus::UNRESOLVED[0].as_str())
        .bind(WithdrawalStatus::UNRESOLVED[1].as_str())
        .bind(WithdrawalStatus::UNRESOLVED[2].as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_uuid(&r, "id"))
            .transpose()
            .map_err(Into::into)
    }

    /// Merge admin-supplied fields; absent fields keep their stored value.
    pub async fn apply_withdrawal_update(
        conn: &mut SqliteConnection,
        id: Uuid,
        update: &WithdrawalUpdate,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            UPDATE withdrawal_requests SET
                verified_amount = COALESCE(?, verified_amount),
                actual_balance_proof_url = COALESCE(?, actual_balance_proof_url),
                after_withdrawal_proof_url = COALESCE(?, after_withdrawal_proof_url),
                admin_notes = COALESCE(?, admin_notes)
            WHERE id = ?
            "#,
        )
        .bind(update.verified_amount.map(|m| m.to_storage()).transpose()?)
        .bind(update.actual_balance_proof_url.as_deref())
        .bind(update.after_withdrawal_proof_url.as_deref())
        .bind(update.admin_notes.as_deref())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Transfer requests
    // =========================================================================

    pub async fn insert_transfer(
        conn: &mut SqliteConnection,
        request: &TransferRequest,
    ) -> Result<(), FundingError> {
        sqlx::query(
            r#"
            INSERT INTO transfer_requests (
                id, user_id, ad_account_id, amount, fee_percentage, fee, total,
                currency, status, admin_notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.user_id.to_string())
        .bind(request.ad_account_id.to_string())
        .bind(request.amount.to_storage()?)
        .bind(request.fee_percentage.to_storage()?)
        .bind(request.fee.to_storage()?)
        .bind(request.total.to_storage()?)
        .bind(request.currency.as_str())
        .bind(request.status.as_str())
        .bind(request.admin_notes.as_deref())
        .bind(request.created_at.as_ms())
        .bind(request.updated_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get_transfer(&self, id: Uuid) -> Result<Option<TransferRequest>, FundingError> {
        let row = sqlx::query(&format!("{} WHERE id = ?", TRANSFER_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| transfer_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn list_transfers(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<TransferRequest>, FundingError> {
        let rows = match user_id {
            Some(user_id) => {
                sqlx::query(&format!(
                    "{} WHERE user_id = ? ORDER BY created_at DESC",
                    TRANSFER_SELECT
                ))
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY created_at DESC", TRANSFER_SELECT))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter()
            .map(transfer_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn set_transfer_notes(
        conn: &mut SqliteConnection,
        id: Uuid,
        admin_notes: Option<&str>,
    ) -> Result<(), FundingError> {
        sqlx::query(
            "UPDATE transfer_requests SET admin_notes = COALESCE(?, admin_notes) WHERE id = ?",
        )
        .bind(admin_notes)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

const ACCOUNT_REQUEST_SELECT: &str = r#"
    SELECT id, user_id, account_name, currency, details, status, fee_percentage,
           external_account_id, ad_account_id, admin_notes, created_at, updated_at
    FROM account_requests
"#;

const TOPUP_COLUMNS: &str = r#"
    SELECT id, user_id, ad_account_id, amount, currency, unique_code,
           total_with_unique_code, payment_method, payment_proof, status,
           admin_id, admin_notes, created_at, updated_at
"#;

const WITHDRAWAL_SELECT: &str = r#"
    SELECT id, user_id, ad_account_id, currency, status, verified_amount,
           actual_balance_proof_url, after_withdrawal_proof_url, admin_notes,
           created_at, updated_at
    FROM withdrawal_requests
"#;

const TRANSFER_SELECT: &str = r#"
    SELECT id, user_id, ad_account_id, amount, fee_percentage, fee, total,
           currency, status, admin_notes, created_at, updated_at
    FROM transfer_requests
"#;

fn account_request_from_row(row: &SqliteRow) -> Result<AccountRequest, sqlx::Error> {
    let details_json: String = row.try_get("details")?;
    let details: PlatformDetails =
        serde_json::from_str(&details_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(AccountRequest {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        account_name: row.try_get("account_name")?,
        currency: parse_enum(row, "currency")?,
        details,
        status: parse_enum(row, "status")?,
        fee_percentage: opt_money(row, "fee_percentage")?,
        external_account_id: row.try_get("external_account_id")?,
        ad_account_id: parse_opt_uuid(row, "ad_account_id")?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

fn topup_from_row(row: &SqliteRow, kind: TopUpKind) -> Result<TopUpRequest, sqlx::Error> {
    Ok(TopUpRequest {
        id: parse_uuid(row, "id")?,
        kind,
        user_id: parse_uuid(row, "user_id")?,
        ad_account_id: parse_opt_uuid(row, "ad_account_id")?,
        amount: money(row, "amount")?,
        currency: parse_enum(row, "currency")?,
        unique_code: money(row, "unique_code")?,
        total_with_unique_code: money(row, "total_with_unique_code")?,
        payment_method: row.try_get("payment_method")?,
        payment_proof: row.try_get("payment_proof")?,
        status: parse_enum(row, "status")?,
        admin_id: parse_opt_uuid(row, "admin_id")?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

fn withdrawal_from_row(row: &SqliteRow) -> Result<WithdrawalRequest, sqlx::Error> {
    Ok(WithdrawalRequest {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        ad_account_id: parse_uuid(row, "ad_account_id")?,
        currency: parse_enum(row, "currency")?,
        status: parse_enum(row, "status")?,
        verified_amount: opt_money(row, "verified_amount")?,
        actual_balance_proof_url: row.try_get("actual_balance_proof_url")?,
        after_withdrawal_proof_url: row.try_get("after_withdrawal_proof_url")?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}

fn transfer_from_row(row: &SqliteRow) -> Result<TransferRequest, sqlx::Error> {
    Ok(TransferRequest {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        ad_account_id: parse_uuid(row, "ad_account_id")?,
        amount: money(row, "amount")?,
        fee_percentage: money(row, "fee_percentage")?,
        fee: money(row, "fee")?,
        total: money(row, "total")?,
        currency: parse_enum(row, "currency")?,
        status: parse_enum(row, "status")?,
        admin_notes: row.try_get("admin_notes")?,
        created_at: time(row, "created_at")?,
        updated_at: time(row, "updated_at")?,
    })
}
