//! Notifications, at most one per (reference_id, type).

use super::{parse_enum, parse_opt_uuid, parse_uuid, time, Repository};
use crate::domain::{Audience, NewNotification, Notification, TimeMs};
use crate::error::{is_unique_violation, FundingError};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

impl Repository {
    /// Insert `notification` unless one with the same reference and type exists.
    ///
    /// Returns `true` if a row was created. The existence check is only a fast path:
    /// the `UNIQUE(reference_id, type)` constraint decides, and a conflict is a no-op.
    pub async fn insert_notification(
        conn: &mut SqliteConnection,
        notification: &NewNotification,
        now: TimeMs,
    ) -> Result<bool, FundingError> {
        let existing = sqlx::query("SELECT 1 FROM notifications WHERE reference_id = ? AND type = ?")
            .bind(&notification.reference_id)
            .bind(&notification.notification_type)
            .fetch_optional(&mut *conn)
            .await?;
        if existing.is_some() {
            debug!(
                reference_id = %notification.reference_id,
                notification_type = %notification.notification_type,
                "notification already exists"
            );
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                id, audience, user_id, admin_id, title, message, type, reference_id,
                is_read, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(reference_id, type) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(notification.audience.as_str())
        .bind(notification.user_id.map(|id| id.to_string()))
        .bind(notification.admin_id.map(|id| id.to_string()))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(&notification.reference_id)
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) => {
                let created = done.rows_affected() > 0;
                if !created {
                    debug!(
                        reference_id = %notification.reference_id,
                        notification_type = %notification.notification_type,
                        "notification lost insert race"
                    );
                }
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Notifications visible to a client (their own) or to an admin (broadcast or
    /// addressed to them). Newest first.
    pub async fn list_notifications(
        &self,
        audience: Audience,
        viewer_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>, FundingError> {
        let scope = match audience {
            Audience::Client => "audience = 'client' AND user_id = ?",
            Audience::Admin => "audience = 'admin' AND (admin_id IS NULL OR admin_id = ?)",
        };
        let unread = if unread_only { " AND is_read = 0" } else { "" };
        let sql = format!(
            "{} WHERE {}{} ORDER BY created_at DESC, id ASC",
            NOTIFICATION_SELECT, scope, unread
        );

        let rows = sqlx::query(&sql)
            .bind(viewer_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// All notifications for a reference, any audience.
    pub async fn notifications_for_reference(
        &self,
        reference_id: &str,
    ) -> Result<Vec<Notification>, FundingError> {
        let rows = sqlx::query(&format!(
            "{} WHERE reference_id = ? ORDER BY created_at ASC, type ASC",
            NOTIFICATION_SELECT
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Mark a notification read if the viewer can see it. Returns `false` otherwise.
    pub async fn mark_notification_read(
        &self,
        id: Uuid,
        audience: Audience,
        viewer_id: Uuid,
    ) -> Result<bool, FundingError> {
        let scope = match audience {
            Audience::Client => "audience = 'client' AND user_id = ?",
            Audience::Admin => "audience = 'admin' AND (admin_id IS NULL OR admin_id = ?)",
        };
        let sql = format!(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND {}",
            scope
        );
        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .bind(viewer_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const NOTIFICATION_SELECT: &str = r#"
    SELECT id, audience, user_id, admin_id, title, message, type, reference_id,
           is_read, created_at
    FROM notifications
"#;

fn notification_from_row(row: &SqliteRow) -> Result<Notification, sqlx::Error> {
    let is_read: i64 = row.try_get("is_read")?;
    Ok(Notification {
        id: parse_uuid(row, "id")?,
        audience: parse_enum(row, "audience")?,
        user_id: parse_opt_uuid(row, "user_id")?,
        admin_id: parse_opt_uuid(row, "admin_id")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        notification_type: row.try_get("type")?,
        reference_id: row.try_get("reference_id")?,
        is_read: is_read != 0,
        created_at: time(row, "created_at")?,
    })
}
