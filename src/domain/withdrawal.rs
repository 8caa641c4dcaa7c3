//! Withdrawals: returning an ad account's remaining funds to the user's withdrawal wallet.

use super::{Currency, Money, TimeMs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    pub enum WithdrawalStatus ("withdrawal status") {
        Pending => "pending",
        Processing => "processing",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
    }
}

impl WithdrawalStatus {
    /// Statuses that block a new withdrawal on the same account.
    pub const UNRESOLVED: [WithdrawalStatus; 3] = [
        WithdrawalStatus::Pending,
        WithdrawalStatus::Processing,
        WithdrawalStatus::Approved,
    ];

    pub fn is_unresolved(&self) -> bool {
        Self::UNRESOLVED.contains(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ad_account_id: Uuid,
    pub currency: Currency,
    pub status: WithdrawalStatus,
    /// Amount the admin confirmed on the platform side.
    pub verified_amount: Option<Money>,
    pub actual_balance_proof_url: Option<String>,
    pub after_withdrawal_proof_url: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

/// Optional fields an admin may attach while moving a withdrawal along.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalUpdate {
    #[serde(default)]
    pub verified_amount: Option<Money>,
    #[serde(default)]
    pub actual_balance_proof_url: Option<String>,
    #[serde(default)]
    pub after_withdrawal_proof_url: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}
