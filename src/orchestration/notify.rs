//! Notification deduplication and best-effort email.

use super::FundingService;
use crate::db::Repository;
use crate::domain::{Audience, Caller, NewNotification, Notification, TimeMs};
use crate::error::FundingError;
use tracing::{debug, warn};
use uuid::Uuid;

impl FundingService {
    /// Record `notification` unless one with the same reference and type exists.
    ///
    /// Returns whether a new notification was created. Safe under concurrent and
    /// retried calls: at most one row ever exists per (reference, type).
    pub async fn notify(&self, notification: &NewNotification) -> Result<bool, FundingError> {
        let mut conn = self.repo.pool().acquire().await?;
        Repository::insert_notification(&mut conn, notification, TimeMs::now()).await
    }

    pub async fn list_notifications(
        &self,
        caller: Caller,
        unread_only: bool,
    ) -> Result<Vec<Notification>, FundingError> {
        self.repo
            .list_notifications(audience_of(caller), caller.user_id, unread_only)
            .await
    }

    pub async fn mark_notification_read(
        &self,
        caller: Caller,
        notification_id: Uuid,
    ) -> Result<(), FundingError> {
        let marked = self
            .repo
            .mark_notification_read(notification_id, audience_of(caller), caller.user_id)
            .await?;
        if !marked {
            return Err(FundingError::not_found("notification", notification_id));
        }
        Ok(())
    }

    /// Email a user in the background. Never fails the caller.
    pub(crate) fn email_user(&self, user_id: Uuid, template: &'static str, data: serde_json::Value) {
        let repo = self.repo.clone();
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            match repo.get_user(user_id).await {
                Ok(Some(user)) => {
                    if !mailer.send_email(&user.email, template, &data).await {
                        warn!(user_id = %user_id, template, "email not delivered");
                    }
                }
                Ok(None) => debug!(user_id = %user_id, template, "email skipped, user gone"),
                Err(e) => warn!(user_id = %user_id, template, error = %e, "email lookup failed"),
            }
        });
    }

    /// Email the configured admin address in the background, if there is one.
    pub(crate) fn email_admins(&self, template: &'static str, data: serde_json::Value) {
        let Some(to) = self.config.admin_email.clone() else {
            return;
        };
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if !mailer.send_email(&to, template, &data).await {
                warn!(template, "admin email not delivered");
            }
        });
    }
}

fn audience_of(caller: Caller) -> Audience {
    if caller.is_admin() {
        Audience::Admin
    } else {
        Audience::Client
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::external::RecordingMailer;
    use futures::future::join_all;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_notify_creates_exactly_one() {
        let (_dir, service) = service().await;
        let reference = Uuid::new_v4();
        let n = NewNotification::for_admins(
            "withdrawal_completed",
            reference,
            "Withdrawal completed",
            "done",
        );

        let results = join_all((0..10).map(|_| service.notify(&n))).await;
        let created = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);

        let stored = service
            .repo()
            .notifications_for_reference(&reference.to_string())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification_is_not_found() {
        let (_dir, service) = service().await;
        let owner = client(&service).await;
        let stranger = client(&service).await;
        service
            .notify(&NewNotification::for_client(
                owner.id,
                "transfer_approved",
                Uuid::new_v4(),
                "t",
                "m",
            ))
            .await
            .unwrap();

        let mine = service
            .list_notifications(Caller::client(owner.id), false)
            .await
            .unwrap();
        let err = service
            .mark_notification_read(Caller::client(stranger.id), mine[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_email_user_is_best_effort() {
        let (_dir, service) = service().await;
        let mailer = Arc::new(RecordingMailer::failing());
        let service = service.with_mailer(mailer.clone());
        let user = client(&service).await;

        service.email_user(user.id, "wallet_topup_verified", serde_json::json!({"amount": "1.00"}));

        for _ in 0..50 {
            if !mailer.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, user.email);
    }
}
