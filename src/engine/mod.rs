//! Pure computation for the funding ledger: transition tables and fee arithmetic.

pub mod fees;
pub mod transitions;

pub use fees::{compute_fee, convert, validate_amount, validate_fee_percentage};
pub use transitions::{ensure_transition, Lifecycle};
