//! Transfers from a user's main wallet into one of their ad accounts.

use super::{Currency, Money, TimeMs};
use serde::Serialize;
use uuid::Uuid;

string_enum! {
    pub enum TransferStatus ("transfer status") {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ad_account_id: Uuid,
    /// Credited to the ad account on approval.
    pub amount: Money,
    pub fee_percentage: Money,
    pub fee: Money,
    /// `amount + fee`, debited from the main wallet on approval.
    pub total: Money,
    pub currency: Currency,
    pub status: TransferStatus,
    pub admin_notes: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}
