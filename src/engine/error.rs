//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::guard::GuardError;
use crate::log::LogError;
use crate::model::AccountId;
use crate::store::StoreError;

/// Top-level error returned by [`Ledger`](super::Ledger) operations.
///
/// Callers branch on the variant; [`LedgerError::is_retryable`] marks the
/// one that is safe to retry unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The amount is unusable here: non-positive where a positive amount is
    /// required, or the resulting balance would not be representable.
    #[error("invalid amount {0}")]
    InvalidAmount(Amount),

    #[error("cannot transfer from account {0} to itself")]
    InvalidTransfer(AccountId),

    #[error("account {0} not found")]
    NotFound(AccountId),

    /// The account's lifecycle state forbids the operation.
    #[error("account {0}: {1}")]
    InvalidState(AccountId, &'static str),

    #[error("insufficient funds in account {0}: balance {1}, requested {2}")]
    InsufficientFunds(AccountId, Amount, Amount),

    #[error("timed out waiting for account {0}")]
    Busy(AccountId),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl LedgerError {
    /// Whether the identical call is safe to retry. Only lock contention
    /// qualifies: it fails before anything is written, while a storage
    /// fault can strand a partial write that a retry would apply again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => LedgerError::NotFound(id),
            StoreError::Closed(id) => LedgerError::InvalidState(id, "account is closed"),
            StoreError::NegativeBalance(amount) => LedgerError::InvalidAmount(amount),
            StoreError::Unavailable(reason) => LedgerError::StorageUnavailable(reason),
        }
    }
}

impl From<LogError> for LedgerError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Unavailable(reason) => LedgerError::StorageUnavailable(reason),
        }
    }
}

impl From<GuardError> for LedgerError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Busy(id) => LedgerError::Busy(id),
        }
    }
}
