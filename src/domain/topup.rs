//! Top-up requests: funding an ad account or a user's main wallet.

use super::{Currency, Money, TimeMs, TransactionType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    pub enum TopUpStatus ("top-up status") {
        Pending => "pending",
        ProofUploaded => "proof_uploaded",
        Verified => "verified",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

/// Which balance a top-up funds. Each kind has its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopUpKind {
    /// Credits an ad account balance.
    Account,
    /// Credits the user's main wallet.
    Wallet,
}

impl TopUpKind {
    pub fn table(&self) -> &'static str {
        match self {
            TopUpKind::Account => "topup_requests",
            TopUpKind::Wallet => "wallet_topup_requests",
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TopUpKind::Account => TransactionType::Topup,
            TopUpKind::Wallet => TransactionType::WalletTopup,
        }
    }

    /// Prefix used for notification types.
    pub fn label(&self) -> &'static str {
        match self {
            TopUpKind::Account => "topup",
            TopUpKind::Wallet => "wallet_topup",
        }
    }

    pub fn entity(&self) -> &'static str {
        match self {
            TopUpKind::Account => "top-up request",
            TopUpKind::Wallet => "wallet top-up request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpRequest {
    pub id: Uuid,
    pub kind: TopUpKind,
    pub user_id: Uuid,
    /// Target account; `None` for wallet top-ups.
    pub ad_account_id: Option<Uuid>,
    pub amount: Money,
    pub currency: Currency,
    pub unique_code: Money,
    pub total_with_unique_code: Money,
    pub payment_method: String,
    pub payment_proof: Option<String>,
    pub status: TopUpStatus,
    pub admin_id: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl TopUpRequest {
    /// Expired requests are those still awaiting payment past the window.
    pub fn is_expired(&self, now: TimeMs, expiry_ms: i64) -> bool {
        matches!(self.status, TopUpStatus::Pending | TopUpStatus::ProofUploaded)
            && self.created_at.plus_ms(expiry_ms) <= now
    }
}

/// A client's top-up order. `ad_account_id` is required for account top-ups and
/// ignored for wallet top-ups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTopUp {
    pub amount: Money,
    pub currency: Currency,
    pub payment_method: String,
    #[serde(default)]
    pub ad_account_id: Option<Uuid>,
}

/// What the client needs to make the matching bank payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpReceipt {
    pub request_id: Uuid,
    pub unique_code: Money,
    pub total_with_unique_code: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: TopUpStatus, created_at: i64) -> TopUpRequest {
        TopUpRequest {
            id: Uuid::new_v4(),
            kind: TopUpKind::Wallet,
            user_id: Uuid::new_v4(),
            ad_account_id: None,
            amount: Money::from_units(100),
            currency: Currency::Idr,
            unique_code: Money::from_units(7),
            total_with_unique_code: Money::from_units(107),
            payment_method: "bank_transfer".to_string(),
            payment_proof: None,
            status,
            admin_id: None,
            admin_notes: None,
            created_at: TimeMs::new(created_at),
            updated_at: TimeMs::new(created_at),
        }
    }

    #[test]
    fn test_expiry_is_inclusive_of_window_end() {
        let req = request(TopUpStatus::Pending, 1_000);
        assert!(!req.is_expired(TimeMs::new(1_999), 1_000));
        assert!(req.is_expired(TimeMs::new(2_000), 1_000));
    }

    #[test]
    fn test_terminal_requests_never_expire() {
        let req = request(TopUpStatus::Verified, 0);
        assert!(!req.is_expired(TimeMs::new(i64::MAX), 1));
    }

    #[test]
    fn test_kind_tables() {
        assert_eq!(TopUpKind::Account.table(), "topup_requests");
        assert_eq!(TopUpKind::Wallet.transaction_type(), TransactionType::WalletTopup);
    }
}
