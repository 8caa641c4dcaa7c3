//! Periodic cancellation of top-ups that never got paid.

use super::FundingService;
use crate::domain::{TimeMs, TopUpKind};
use crate::error::FundingError;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub cancelled: usize,
    /// Candidates another actor moved on before this sweep reached them.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerService {
    funding: FundingService,
    interval: Duration,
}

impl SchedulerService {
    pub fn new(funding: FundingService, interval: Duration) -> Self {
        Self { funding, interval }
    }

    /// Cancel every account and wallet top-up that was still awaiting payment
    /// `topup_expiry_ms` after it was created.
    ///
    /// A failure on one request is logged and counted; the sweep carries on.
    pub async fn run_once(&self, now: TimeMs) -> Result<SweepReport, FundingError> {
        let cutoff = now.minus_ms(self.funding.config().topup_expiry_ms);
        let mut report = SweepReport::default();

        for kind in [TopUpKind::Account, TopUpKind::Wallet] {
            let candidates = self.funding.repo().expired_topups(kind, cutoff).await?;
            for request in candidates {
                report.examined += 1;
                match self.funding.expire_topup(&request, now).await {
                    Ok(()) => report.cancelled += 1,
                    Err(FundingError::IllegalTransition { .. } | FundingError::StaleState(_)) => {
                        debug!(request_id = %request.id, "expiry candidate already moved on");
                        report.skipped += 1;
                    }
                    Err(e) => {
                        warn!(request_id = %request.id, kind = kind.label(), error = %e, "auto-cancel failed");
                        report.failed += 1;
                    }
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                cancelled = report.cancelled,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    /// Run `run_once` every `interval` until the returned task is aborted.
    /// The first sweep happens one interval after spawning.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            info!(interval_secs = self.interval.as_secs(), "top-up expiry scheduler started");

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(TimeMs::now()).await {
                    warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{Caller, Currency, Money, NewTopUp, TopUpStatus, TransactionStatus};

    fn order() -> NewTopUp {
        NewTopUp {
            amount: Money::from_units(50_000),
            currency: Currency::Idr,
            payment_method: "bank_transfer".to_string(),
            ad_account_id: None,
        }
    }

    fn past_expiry(service: &FundingService) -> TimeMs {
        TimeMs::now().plus_ms(service.config().topup_expiry_ms + 1_000)
    }

    #[tokio::test]
    async fn test_sweep_cancels_stale_wallet_topup_once() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let receipt = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();
        let scheduler = SchedulerService::new(service.clone(), Duration::from_secs(3600));
        let now = past_expiry(&service);

        let report = scheduler.run_once(now).await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.failed, 0);

        let request = service
            .get_topup(TopUpKind::Wallet, Caller::client(user.id), receipt.request_id)
            .await
            .unwrap();
        assert_eq!(request.status, TopUpStatus::Cancelled);
        assert!(service
            .get_wallet_balances(user.id)
            .await
            .unwrap()
            .main_idr
            .is_zero());

        let tx = service
            .repo()
            .get_transaction_for_request(receipt.request_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);

        let second = scheduler.run_once(now).await.unwrap();
        assert_eq!(second.examined, 0);

        let notes = service
            .repo()
            .notifications_for_reference(&receipt.request_id.to_string())
            .await
            .unwrap();
        let auto: Vec<_> = notes
            .iter()
            .filter(|n| n.notification_type == "wallet_topup_auto_cancelled")
            .collect();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_sweep_ignores_fresh_and_settled_topups() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let fresh = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();
        let settled = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();
        service
            .cancel_topup(TopUpKind::Wallet, user.id, settled.request_id)
            .await
            .unwrap();

        let scheduler = SchedulerService::new(service.clone(), Duration::from_secs(3600));
        let report = scheduler.run_once(TimeMs::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());

        let request = service
            .get_topup(TopUpKind::Wallet, Caller::client(user.id), fresh.request_id)
            .await
            .unwrap();
        assert_eq!(request.status, TopUpStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweep_cancels_proof_uploaded_topups() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let receipt = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();
        service
            .attach_proof(TopUpKind::Wallet, user.id, receipt.request_id, "proof.png")
            .await
            .unwrap();

        let scheduler = SchedulerService::new(service.clone(), Duration::from_secs(3600));
        let report = scheduler.run_once(past_expiry(&service)).await.unwrap();
        assert_eq!(report.cancelled, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_cancel_each_request_once() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        for _ in 0..3 {
            service
                .create_topup(TopUpKind::Wallet, user.id, order())
                .await
                .unwrap();
        }
        let scheduler = SchedulerService::new(service.clone(), Duration::from_secs(3600));
        let now = past_expiry(&service);

        let (a, b) = tokio::join!(scheduler.run_once(now), scheduler.run_once(now));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.cancelled + b.cancelled, 3);
        assert_eq!(a.failed + b.failed, 0);
    }

    #[tokio::test]
    async fn test_one_failing_cancellation_does_not_stop_the_sweep() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let blocked = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();
        let other = service
            .create_topup(TopUpKind::Wallet, user.id, order())
            .await
            .unwrap();

        let trigger = format!(
            "CREATE TRIGGER block_cancel BEFORE UPDATE ON wallet_topup_requests \
             WHEN OLD.id = '{}' BEGIN SELECT RAISE(ABORT, 'row is locked by ops'); END",
            blocked.request_id
        );
        sqlx::query(&trigger)
            .execute(service.repo().pool())
            .await
            .unwrap();

        let scheduler = SchedulerService::new(service.clone(), Duration::from_secs(3600));
        let report = scheduler.run_once(past_expiry(&service)).await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.skipped, 0);

        let caller = Caller::client(user.id);
        let still_pending = service
            .get_topup(TopUpKind::Wallet, caller, blocked.request_id)
            .await
            .unwrap();
        assert_eq!(still_pending.status, TopUpStatus::Pending);
        let cancelled = service
            .get_topup(TopUpKind::Wallet, caller, other.request_id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, TopUpStatus::Cancelled);
    }
}
