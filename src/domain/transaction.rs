//! Transaction ledger rows: one per request, mirroring the request's lifecycle.

use super::{Currency, Money, TimeMs};
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

string_enum! {
    pub enum TransactionType ("transaction type") {
        AccountRequest => "account_request",
        Topup => "topup",
        WalletTopup => "wallet_topup",
        WithdrawRequest => "withdraw_request",
        Transfer => "transfer",
    }
}

string_enum! {
    pub enum TransactionStatus ("transaction status") {
        Pending => "pending",
        Processing => "processing",
        Approved => "approved",
        Completed => "completed",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Failed => "failed",
        Disabled => "disabled",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The request this row belongs to (unique).
    pub request_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub description: String,
    pub currency: Currency,
    pub amount: Money,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

/// Raw list filters as received from callers.
///
/// Every field is optional and lenient: unknown names and malformed dates are
/// ignored rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionFilter {
    #[serde(default, rename = "type")]
    pub tx_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// A filter with every field resolved to a typed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    pub tx_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    /// Inclusive lower bound.
    pub from: Option<TimeMs>,
    /// Inclusive upper bound.
    pub to: Option<TimeMs>,
}

impl TransactionFilter {
    pub fn resolve(&self) -> TransactionQuery {
        TransactionQuery {
            tx_type: self
                .tx_type
                .as_deref()
                .and_then(|s| TransactionType::from_str(s.trim()).ok()),
            status: self
                .status
                .as_deref()
                .and_then(|s| TransactionStatus::from_str(s.trim()).ok()),
            from: self.start_date.as_deref().and_then(|s| parse_bound(s, false)),
            to: self.end_date.as_deref().and_then(|s| parse_bound(s, true)),
        }
    }
}

/// Parse an RFC 3339 instant or a `YYYY-MM-DD` date.
///
/// A bare date used as an upper bound covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<TimeMs> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(TimeMs::new(dt.timestamp_millis()));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::MIN
    };
    Some(TimeMs::new(date.and_time(time).and_utc().timestamp_millis()))
}

/// Dashboard aggregate for one (type, status) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub currency: Currency,
    pub count: i64,
    pub total_amount: Money,
}
