//! Account requests and the ad accounts they create.

use super::{FundingService, TransactionChange, NEW_TRANSACTION_STATUS};
use crate::db::Repository;
use crate::domain::{
    AccountDecision, AccountRequest, AccountRequestStatus, AdAccount, AdAccountStatus, Caller,
    Money, NewAccountRequest, NewNotification, Platform, TimeMs, Transaction, TransactionType,
};
use crate::engine::{ensure_transition, validate_fee_percentage};
use crate::error::FundingError;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const TABLE: &str = "account_requests";

fn describe(account_name: &str, platform: Platform) -> String {
    format!("Ad account request: {} ({})", account_name, platform)
}

impl FundingService {
    pub async fn create_account_request(
        &self,
        user_id: Uuid,
        new: NewAccountRequest,
    ) -> Result<AccountRequest, FundingError> {
        new.validate()?;
        self.get_user(user_id).await?;

        let now = TimeMs::now();
        let request = AccountRequest {
            id: Uuid::new_v4(),
            user_id,
            account_name: new.account_name.trim().to_string(),
            currency: new.currency,
            details: new.details,
            status: AccountRequestStatus::Pending,
            fee_percentage: None,
            external_account_id: None,
            ad_account_id: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        };
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            request_id: request.id,
            tx_type: TransactionType::AccountRequest,
            status: NEW_TRANSACTION_STATUS,
            description: describe(&request.account_name, request.platform()),
            currency: request.currency,
            amount: Money::zero(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        Repository::insert_account_request(&mut tx, &request).await?;
        Repository::insert_transaction(&mut tx, &transaction).await?;
        Repository::insert_notification(
            &mut tx,
            &NewNotification::for_admins(
                "new_account_request",
                request.id,
                "New ad account request",
                format!(
                    "{} account '{}' requested",
                    request.platform(),
                    request.account_name
                ),
            ),
            now,
        )
        .await?;
        tx.commit().await?;

        info!(request_id = %request.id, platform = %request.platform(), "account request created");
        self.email_admins(
            "new_account_request",
            json!({ "request_id": request.id, "account_name": request.account_name }),
        );
        Ok(request)
    }

    /// Drive an account request to `to`, applying the admin's decision fields.
    ///
    /// Approval needs a fee percentage, and an `account_id` for Facebook; it creates
    /// the active ad account. Rejection suspends and disabling disables that account.
    pub async fn update_account_request_status(
        &self,
        request_id: Uuid,
        to: AccountRequestStatus,
        decision: AccountDecision,
    ) -> Result<AccountRequest, FundingError> {
        let request = self.load_account_request(request_id).await?;
        let from = request.status;
        ensure_transition(from, to)?;

        let account_name = decision
            .account_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&request.account_name)
            .to_string();
        let external_account_id = decision
            .account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| request.external_account_id.clone());
        let fee_percentage = decision
            .fee_percentage
            .map(validate_fee_percentage)
            .transpose()?;

        if to == AccountRequestStatus::Approved {
            if fee_percentage.or(request.fee_percentage).is_none() {
                return Err(FundingError::validation(
                    "fee_percentage",
                    "required to approve an account request",
                ));
            }
            if request.platform() == Platform::Facebook && external_account_id.is_none() {
                return Err(FundingError::validation(
                    "account_id",
                    "required to approve a facebook account request",
                ));
            }
        }

        let now = TimeMs::now();
        let mut tx = self
            .begin_transition(TABLE, request_id, from, to, now)
            .await?;

        let mut created_account = None;
        match to {
            AccountRequestStatus::Approved => {
                let account = AdAccount {
                    id: Uuid::new_v4(),
                    user_id: request.user_id,
                    request_id: Some(request.id),
                    platform: request.platform(),
                    account_name: account_name.clone(),
                    external_account_id: external_account_id.clone(),
                    balance: Money::zero(),
                    status: AdAccountStatus::Active,
                    fee_percentage: fee_percentage
                        .or(request.fee_percentage)
                        .unwrap_or_default(),
                    currency: request.currency,
                    last_topup_date: None,
                    created_at: now,
                };
                Repository::insert_ad_account(&mut tx, &account).await?;
                created_account = Some(account.id);
            }
            AccountRequestStatus::Rejected | AccountRequestStatus::Disabled => {
                let status = if to == AccountRequestStatus::Rejected {
                    AdAccountStatus::Suspended
                } else {
                    AdAccountStatus::Disabled
                };
                if let Some(account_id) = Repository::ad_account_for_request(&mut tx, request_id).await? {
                    Repository::set_ad_account_status(&mut tx, account_id, status).await?;
                }
            }
            AccountRequestStatus::Pending
            | AccountRequestStatus::Processing
            | AccountRequestStatus::Completed
            | AccountRequestStatus::Failed => {}
        }

        Repository::record_account_decision(
            &mut tx,
            request_id,
            Some(&account_name),
            fee_percentage,
            external_account_id.as_deref(),
            created_account,
            decision.admin_notes.as_deref(),
        )
        .await?;

        let notification_type = format!("account_request_{}", to);
        self.finish_transition(
            tx,
            request_id,
            from,
            to,
            TransactionChange::describe(describe(&account_name, request.platform())),
            NewNotification::for_client(
                request.user_id,
                notification_type.as_str(),
                request_id,
                "Ad account request updated",
                format!("Your request for '{}' is now {}", account_name, to),
            ),
            now,
        )
        .await?;

        self.email_user(
            request.user_id,
            "account_request_status",
            json!({ "request_id": request_id, "account_name": account_name, "status": to }),
        );
        self.load_account_request(request_id).await
    }

    async fn load_account_request(&self, request_id: Uuid) -> Result<AccountRequest, FundingError> {
        self.repo
            .get_account_request(request_id)
            .await?
            .ok_or_else(|| FundingError::not_found("account request", request_id))
    }

    pub async fn get_account_request(
        &self,
        caller: Caller,
        request_id: Uuid,
    ) -> Result<AccountRequest, FundingError> {
        self.repo
            .get_account_request(request_id)
            .await?
            .filter(|r| caller.can_see(r.user_id))
            .ok_or_else(|| FundingError::not_found("account request", request_id))
    }

    pub async fn list_account_requests(
        &self,
        caller: Caller,
    ) -> Result<Vec<AccountRequest>, FundingError> {
        self.repo.list_account_requests(caller.scope()).await
    }

    pub async fn list_ad_accounts(&self, caller: Caller) -> Result<Vec<AdAccount>, FundingError> {
        self.repo.list_ad_accounts(caller.scope()).await
    }

    /// The ad account, if `caller` may see it. Foreign accounts read as missing.
    pub async fn get_ad_account(
        &self,
        caller: Caller,
        account_id: Uuid,
    ) -> Result<AdAccount, FundingError> {
        self.repo
            .get_ad_account(account_id)
            .await?
            .filter(|a| caller.can_see(a.user_id))
            .ok_or_else(|| FundingError::not_found("ad account", account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::domain::{
        Currency, FacebookAccountRequest, GoogleAccountRequest, PlatformDetails, TransactionStatus,
    };

    fn facebook(name: &str) -> NewAccountRequest {
        NewAccountRequest {
            account_name: name.to_string(),
            currency: Currency::Idr,
            details: PlatformDetails::Facebook(FacebookAccountRequest {
                business_manager_id: "bm-1".to_string(),
                page_urls: vec!["https://facebook.com/shop".to_string()],
            }),
        }
    }

    #[tokio::test]
    async fn test_facebook_approval_requires_account_id_and_fee() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let request = service
            .create_account_request(user.id, facebook("Shop"))
            .await
            .unwrap();

        let err = service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Approved,
                AccountDecision {
                    fee_percentage: Some(Money::from_units(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Validation { field: "account_id", .. }));

        let err = service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Approved,
                AccountDecision {
                    account_id: Some("act_1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::Validation { field: "fee_percentage", .. }));

        // nothing changed
        let reloaded = service
            .get_account_request(Caller::client(user.id), request.id)
            .await
            .unwrap();
        assert_eq!(reloaded.status, AccountRequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_approval_creates_active_account_and_syncs_renamed_description() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let request = service
            .create_account_request(user.id, facebook("Old Name"))
            .await
            .unwrap();

        let approved = service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Approved,
                AccountDecision {
                    fee_percentage: Some("2.5".parse().unwrap()),
                    account_id: Some("act_42".to_string()),
                    account_name: Some("New Name".to_string()),
                    admin_notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(approved.status, AccountRequestStatus::Approved);
        assert_eq!(approved.account_name, "New Name");

        let account_id = approved.ad_account_id.unwrap();
        let account = service
            .get_ad_account(Caller::client(user.id), account_id)
            .await
            .unwrap();
        assert_eq!(account.status, AdAccountStatus::Active);
        assert_eq!(account.account_name, "New Name");
        assert_eq!(account.external_account_id.as_deref(), Some("act_42"));
        assert_eq!(account.fee_percentage, "2.5".parse().unwrap());

        let tx = service
            .repo()
            .get_transaction_for_request(request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Approved);
        assert!(tx.description.contains("New Name"));
    }

    #[tokio::test]
    async fn test_disable_after_approval_disables_account() {
        let (_dir, service) = service().await;
        let user = client(&service).await;
        let request = service
            .create_account_request(
                user.id,
                NewAccountRequest {
                    account_name: "Search".to_string(),
                    currency: Currency::Usd,
                    details: PlatformDetails::Google(GoogleAccountRequest {
                        gmail: "ads@gmail.com".to_string(),
                        website: "https://shop.example".to_string(),
                    }),
                },
            )
            .await
            .unwrap();
        let approved = service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Approved,
                AccountDecision {
                    fee_percentage: Some(Money::from_units(3)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Disabled,
                AccountDecision::default(),
            )
            .await
            .unwrap();
        let account = service
            .get_ad_account(Caller::admin(Uuid::nil()), approved.ad_account_id.unwrap())
            .await
            .unwrap();
        assert_eq!(account.status, AdAccountStatus::Disabled);

        let err = service
            .update_account_request_status(
                request.id,
                AccountRequestStatus::Approved,
                AccountDecision::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_foreign_request_reads_as_not_found() {
        let (_dir, service) = service().await;
        let owner = client(&service).await;
        let other = client(&service).await;
        let request = service
            .create_account_request(owner.id, facebook("Mine"))
            .await
            .unwrap();
        let err = service
            .get_account_request(Caller::client(other.id), request.id)
            .await
            .unwrap_err();
        assert!(matches!(err, FundingError::NotFound { .. }));
    }
}
