//! Users, their wallet balances, and ad accounts.

use super::{Currency, Money, Platform, Role, TimeMs, WalletBucket, WalletKind};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: TimeMs,
}

/// The four wallet buckets of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalletBalances {
    pub main_idr: Money,
    pub main_usd: Money,
    pub withdrawal_idr: Money,
    pub withdrawal_usd: Money,
}

impl WalletBalances {
    pub fn get(&self, bucket: WalletBucket) -> Money {
        match (bucket.kind, bucket.currency) {
            (WalletKind::Main, Currency::Idr) => self.main_idr,
            (WalletKind::Main, Currency::Usd) => self.main_usd,
            (WalletKind::Withdrawal, Currency::Idr) => self.withdrawal_idr,
            (WalletKind::Withdrawal, Currency::Usd) => self.withdrawal_usd,
        }
    }
}

/// The authenticated principal behind a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn client(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Client,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner filter for list queries: admins see everything.
    pub fn scope(&self) -> Option<Uuid> {
        if self.is_admin() {
            None
        } else {
            Some(self.user_id)
        }
    }

    pub fn can_see(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

string_enum! {
    pub enum AdAccountStatus ("ad account status") {
        Pending => "pending",
        Active => "active",
        Suspended => "suspended",
        Disabled => "disabled",
    }
}

/// An advertising account funded through this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Account request that created this account.
    pub request_id: Option<Uuid>,
    pub platform: Platform,
    pub account_name: String,
    /// Identifier on the ad platform itself.
    pub external_account_id: Option<String>,
    pub balance: Money,
    pub status: AdAccountStatus,
    pub fee_percentage: Money,
    pub currency: Currency,
    pub last_topup_date: Option<TimeMs>,
    pub created_at: TimeMs,
}

impl AdAccount {
    /// A funded account without a recorded top-up date is a data-integrity defect.
    pub fn has_topup_date_gap(&self) -> bool {
        self.balance.is_positive() && self.last_topup_date.is_none()
    }
}
