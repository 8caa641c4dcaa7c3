pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod external;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, BalanceTarget, Ledger, Repository};
pub use domain::{
    AccountRequest, AccountRequestStatus, AdAccount, Caller, Currency, Money, Role, TimeMs,
    TopUpKind, TopUpStatus, Transaction, TransactionStatus, TransactionType, TransferStatus,
    WalletBalances, WalletBucket, WithdrawalStatus,
};
pub use error::{AppError, FundingError};
pub use orchestration::{FundingConfig, FundingService, SchedulerService, SweepReport};
