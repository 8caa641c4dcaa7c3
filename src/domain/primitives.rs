//! Domain primitives: TimeMs, Currency, Platform, WalletBucket, Role.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or supplied enum name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }

    pub fn minus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(ms))
    }

    /// RFC 3339 rendering, used in API responses and invoices.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Idr,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Idr => "IDR",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDR" => Ok(Currency::Idr),
            "USD" => Ok(Currency::Usd),
            _ => Err(UnknownVariant::new("currency", s)),
        }
    }
}

/// Advertising platform an ad account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Google,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Google => "google",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Platform::Facebook),
            "google" => Ok(Platform::Google),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(UnknownVariant::new("platform", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    /// Spendable funds: credited by wallet top-ups, debited by transfers.
    Main,
    /// Funds returned from ad accounts by completed withdrawals.
    Withdrawal,
}

/// One of the four per-user wallet balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletBucket {
    pub kind: WalletKind,
    pub currency: Currency,
}

impl WalletBucket {
    pub fn main(currency: Currency) -> Self {
        Self {
            kind: WalletKind::Main,
            currency,
        }
    }

    pub fn withdrawal(currency: Currency) -> Self {
        Self {
            kind: WalletKind::Withdrawal,
            currency,
        }
    }

    /// Column on `users` holding this balance.
    pub fn column(&self) -> &'static str {
        match (self.kind, self.currency) {
            (WalletKind::Main, Currency::Idr) => "main_wallet_idr",
            (WalletKind::Main, Currency::Usd) => "main_wallet_usd",
            (WalletKind::Withdrawal, Currency::Idr) => "withdrawal_wallet_idr",
            (WalletKind::Withdrawal, Currency::Usd) => "withdrawal_wallet_usd",
        }
    }

    /// Legacy column kept equal to the main wallet balance.
    pub fn legacy_mirror_column(&self) -> Option<&'static str> {
        match self.kind {
            WalletKind::Main => Some(match self.currency {
                Currency::Idr => "wallet_balance_idr",
                Currency::Usd => "wallet_balance_usd",
            }),
            WalletKind::Withdrawal => None,
        }
    }
}

impl fmt::Display for WalletBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "client" => Ok(Role::Client),
            _ => Err(UnknownVariant::new("role", s)),
        }
    }
}
