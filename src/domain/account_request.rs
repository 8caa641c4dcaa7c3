//! Client requests to open an ad account, one variant per platform.

use super::{Currency, Money, Platform, TimeMs};
use crate::error::FundingError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    pub enum AccountRequestStatus ("account request status") {
        Pending => "pending",
        Processing => "processing",
        Approved => "approved",
        Completed => "completed",
        Rejected => "rejected",
        Failed => "failed",
        Disabled => "disabled",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacebookAccountRequest {
    pub business_manager_id: String,
    pub page_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleAccountRequest {
    pub gmail: String,
    pub website: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TikTokAccountRequest {
    pub business_center_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Platform-specific part of an account request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformDetails {
    Facebook(FacebookAccountRequest),
    Google(GoogleAccountRequest),
    Tiktok(TikTokAccountRequest),
}

impl PlatformDetails {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformDetails::Facebook(_) => Platform::Facebook,
            PlatformDetails::Google(_) => Platform::Google,
            PlatformDetails::Tiktok(_) => Platform::Tiktok,
        }
    }

    pub fn validate(&self) -> Result<(), FundingError> {
        match self {
            PlatformDetails::Facebook(fb) => {
                require_non_empty("business_manager_id", &fb.business_manager_id)?;
                if fb.page_urls.iter().all(|u| u.trim().is_empty()) {
                    return Err(FundingError::validation(
                        "page_urls",
                        "at least one page url is required",
                    ));
                }
            }
            PlatformDetails::Google(g) => {
                if !g.gmail.contains('@') {
                    return Err(FundingError::validation("gmail", "must be an email address"));
                }
                require_non_empty("website", &g.website)?;
            }
            PlatformDetails::Tiktok(t) => {
                require_non_empty("business_center_id", &t.business_center_id)?;
            }
        }
        Ok(())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), FundingError> {
    if value.trim().is_empty() {
        return Err(FundingError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Client input for a new account request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccountRequest {
    pub account_name: String,
    pub currency: Currency,
    #[serde(flatten)]
    pub details: PlatformDetails,
}

impl NewAccountRequest {
    pub fn validate(&self) -> Result<(), FundingError> {
        require_non_empty("account_name", &self.account_name)?;
        self.details.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_name: String,
    pub currency: Currency,
    pub details: PlatformDetails,
    pub status: AccountRequestStatus,
    pub fee_percentage: Option<Money>,
    pub external_account_id: Option<String>,
    pub ad_account_id: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl AccountRequest {
    pub fn platform(&self) -> Platform {
        self.details.platform()
    }
}

/// Admin-supplied fields accompanying an account request status change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDecision {
    #[serde(default)]
    pub fee_percentage: Option<Money>,
    /// Platform account id; required when approving a facebook request.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Replacement account name chosen at approval time.
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_union_deserializes_per_platform() {
        let json = serde_json::json!({
            "account_name": "Spring Sale",
            "currency": "IDR",
            "platform": "facebook",
            "business_manager_id": "bm-1",
            "page_urls": ["https://fb.com/shop"]
        });
        let req: NewAccountRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.details.platform(), Platform::Facebook);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_google_requires_email() {
        let req = NewAccountRequest {
            account_name: "Search".to_string(),
            currency: Currency::Usd,
            details: PlatformDetails::Google(GoogleAccountRequest {
                gmail: "not-an-email".to_string(),
                website: "https://example.com".to_string(),
            }),
        };
        match req.validate() {
            Err(FundingError::Validation { field, .. }) => assert_eq!(field, "gmail"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let json = serde_json::json!({
            "account_name": "x",
            "currency": "IDR",
            "platform": "myspace"
        });
        assert!(serde_json::from_value::<NewAccountRequest>(json).is_err());
    }

    #[test]
    fn test_blank_account_name_rejected() {
        let req = NewAccountRequest {
            account_name: "  ".to_string(),
            currency: Currency::Idr,
            details: PlatformDetails::Tiktok(TikTokAccountRequest {
                business_center_id: "bc".to_string(),
                website: None,
            }),
        };
        assert!(req.validate().is_err());
    }
}
