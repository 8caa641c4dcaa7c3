//! Domain types for the ad-account funding ledger.
//!
//! This module provides:
//! - Fixed-point money via the Money wrapper
//! - Primitives: TimeMs, Currency, Platform, WalletBucket, Role
//! - Request entities and their status enums
//! - Transaction ledger rows and notifications

/// Declares a unit enum stored and serialized as a fixed lowercase name.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::domain::UnknownVariant::new($kind, s)),
                }
            }
        }
    };
}

pub mod account;
pub mod account_request;
pub mod money;
pub mod notification;
pub mod primitives;
pub mod topup;
pub mod transaction;
pub mod transfer;
pub mod withdrawal;

pub use account::{AdAccount, AdAccountStatus, Caller, User, WalletBalances};
pub use account_request::{
    AccountDecision, AccountRequest, AccountRequestStatus, FacebookAccountRequest,
    GoogleAccountRequest, NewAccountRequest, PlatformDetails, TikTokAccountRequest,
};
pub use money::{Money, MoneyError};
pub use notification::{Audience, NewNotification, Notification};
pub use primitives::{Currency, Platform, Role, TimeMs, UnknownVariant, WalletBucket, WalletKind};
pub use topup::{NewTopUp, TopUpKind, TopUpReceipt, TopUpRequest, TopUpStatus};
pub use transaction::{
    Transaction, TransactionFilter, TransactionQuery, TransactionStatus, TransactionSummary,
    TransactionType,
};
pub use transfer::{TransferRequest, TransferStatus};
pub use withdrawal::{WithdrawalRequest, WithdrawalStatus, WithdrawalUpdate};
