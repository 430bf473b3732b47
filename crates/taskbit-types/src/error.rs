use crate::{Amount, TaskId, WithdrawalId};
use thiserror::Error;

/// Ledger error taxonomy.
///
/// Every failure crosses the component boundary as one of these variants;
/// a failed operation leaves ledger state unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Anonymous caller on a sensitive operation
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Deposit or withdrawal below the configured floor
    #[error("amount below minimum: minimum {minimum}, got {amount}")]
    BelowMinimum { minimum: Amount, amount: Amount },

    /// Debit would exceed the available balance
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    /// Unknown escrow, withdrawal, or transaction id
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller lacks rights over the target escrow
    #[error("caller is not the escrow payer")]
    NotPayer,

    /// A locked escrow already exists for the task
    #[error("escrow already locked for {0}")]
    AlreadyLocked(TaskId),

    /// The escrow was already released or refunded
    #[error("escrow for {0} already released or refunded")]
    AlreadyReleased(TaskId),

    /// The withdrawal request was already processed
    #[error("withdrawal {0} already processed")]
    AlreadyProcessed(WithdrawalId),

    /// Requested platform fee exceeds the cap
    #[error("fee too high: maximum {maximum}%, requested {requested}%")]
    FeeTooHigh { maximum: u8, requested: u8 },

    /// Persistence backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
