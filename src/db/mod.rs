//! SQLite persistence.
//!
//! - `migrations`: connection pool setup, pragmas and schema
//! - `repo`: the `Repository` and the `Ledger` balance mutations

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{BalanceTarget, Ledger, LedgerEntry, Repository};
