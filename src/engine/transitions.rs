//! Legal status transitions for every request kind, and the status each
//! transition writes onto the paired transaction row.

use crate::domain::{
    AccountRequestStatus, TopUpStatus, TransactionStatus, TransferStatus, WithdrawalStatus,
};
use crate::error::FundingError;
use std::fmt;

/// A request lifecycle expressed as a transition table.
pub trait Lifecycle: Copy + Eq + fmt::Display + 'static {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Statuses reachable in one step from `self`.
    fn next_states(self) -> &'static [Self];

    /// Status written onto the paired transaction row.
    fn transaction_status(self) -> TransactionStatus;

    fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    fn can_transition_to(self, to: Self) -> bool {
        self.next_states().contains(&to)
    }
}

/// Reject `from -> to` unless the table allows it.
pub fn ensure_transition<S: Lifecycle>(from: S, to: S) -> Result<(), FundingError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(FundingError::IllegalTransition {
            entity: S::ENTITY,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

impl Lifecycle for AccountRequestStatus {
    const ENTITY: &'static str = "account request";

    fn next_states(self) -> &'static [Self] {
        use AccountRequestStatus::*;
        match self {
            Pending => &[Approved, Rejected, Processing],
            Processing => &[Approved, Rejected, Failed],
            Approved => &[Completed, Disabled, Rejected],
            Completed => &[Disabled],
            Rejected | Failed | Disabled => &[],
        }
    }

    fn transaction_status(self) -> TransactionStatus {
        match self {
            AccountRequestStatus::Pending => TransactionStatus::Pending,
            AccountRequestStatus::Processing => TransactionStatus::Processing,
            AccountRequestStatus::Approved => TransactionStatus::Approved,
            AccountRequestStatus::Completed => TransactionStatus::Completed,
            AccountRequestStatus::Rejected => TransactionStatus::Rejected,
            AccountRequestStatus::Failed => TransactionStatus::Failed,
            AccountRequestStatus::Disabled => TransactionStatus::Disabled,
        }
    }
}

impl Lifecycle for TopUpStatus {
    const ENTITY: &'static str = "top-up request";

    fn next_states(self) -> &'static [Self] {
        use TopUpStatus::*;
        match self {
            Pending => &[ProofUploaded, Cancelled],
            ProofUploaded => &[Verified, Rejected, Cancelled],
            Verified | Rejected | Cancelled => &[],
        }
    }

    fn transaction_status(self) -> TransactionStatus {
        match self {
            TopUpStatus::Pending => TransactionStatus::Pending,
            TopUpStatus::ProofUploaded => TransactionStatus::Processing,
            TopUpStatus::Verified => TransactionStatus::Completed,
            TopUpStatus::Rejected => TransactionStatus::Rejected,
            TopUpStatus::Cancelled => TransactionStatus::Cancelled,
        }
    }
}

impl Lifecycle for WithdrawalStatus {
    const ENTITY: &'static str = "withdrawal";

    fn next_states(self) -> &'static [Self] {
        use WithdrawalStatus::*;
        match self {
            Pending => &[Processing, Rejected],
            Processing => &[Approved, Rejected],
            Approved => &[Completed],
            Rejected | Completed => &[],
        }
    }

    fn transaction_status(self) -> TransactionStatus {
        match self {
            WithdrawalStatus::Pending => TransactionStatus::Pending,
            WithdrawalStatus::Processing => TransactionStatus::Processing,
            WithdrawalStatus::Approved => TransactionStatus::Approved,
            WithdrawalStatus::Completed => TransactionStatus::Completed,
            WithdrawalStatus::Rejected => TransactionStatus::Rejected,
        }
    }
}

impl Lifecycle for TransferStatus {
    const ENTITY: &'static str = "transfer";

    fn next_states(self) -> &'static [Self] {
        use TransferStatus::*;
        match self {
            Pending => &[Approved, Rejected],
            Approved | Rejected => &[],
        }
    }

    fn transaction_status(self) -> TransactionStatus {
        match self {
            TransferStatus::Pending => TransactionStatus::Pending,
            TransferStatus::Approved => TransactionStatus::Completed,
            TransferStatus::Rejected => TransactionStatus::Rejected,
        }
    }
}
