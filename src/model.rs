//! Core domain types for the ledger.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::Amount;

/// Account identifier, assigned sequentially by the store.
pub type AccountId = u64;

/// Transaction record identifier, assigned sequentially by the log.
pub type RecordId = u64;

/// Identifier shared by the two records of one transfer.
pub type CorrelationId = u64;

/// Lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Account accepts deposits, withdrawals, and transfers.
    Active,
    /// Account is closed; balance-mutating operations are rejected.
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A customer account with its current balance.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique account number.
    pub id: AccountId,
    /// Display name of the account holder.
    pub owner: String,
    /// Current balance; never negative.
    pub balance: Amount,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: AccountStatus,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// The kind of balance movement a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Funds credited from outside the ledger.
    Deposit,
    /// Funds debited to outside the ledger.
    Withdrawal,
    /// Debit half of a transfer.
    TransferOut,
    /// Credit half of a transfer.
    TransferIn,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Deposit => write!(f, "deposit"),
            RecordKind::Withdrawal => write!(f, "withdrawal"),
            RecordKind::TransferOut => write!(f, "transfer_out"),
            RecordKind::TransferIn => write!(f, "transfer_in"),
        }
    }
}

/// One committed entry in the append-only transaction log.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    /// Unique record identifier, monotonically increasing.
    pub id: RecordId,
    /// What kind of movement this is.
    pub kind: RecordKind,
    /// The account whose balance moved.
    pub account: AccountId,
    /// The other account of a transfer, if any.
    pub counterparty: Option<AccountId>,
    /// Links the two halves of one transfer.
    pub correlation: Option<CorrelationId>,
    /// The amount moved; always positive.
    pub amount: Amount,
    /// The account's balance after the movement.
    pub balance_after: Amount,
    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
}

/// A record not yet committed to the log. The log assigns the identifier
/// and timestamp on append.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub kind: RecordKind,
    pub account: AccountId,
    pub counterparty: Option<AccountId>,
    pub correlation: Option<CorrelationId>,
    pub amount: Amount,
    pub balance_after: Amount,
}

impl NewRecord {
    /// Draft record for a deposit into `account`.
    pub fn deposit(account: AccountId, amount: Amount, balance_after: Amount) -> Self {
        Self {
            kind: RecordKind::Deposit,
            account,
            counterparty: None,
            correlation: None,
            amount,
            balance_after,
        }
    }

    /// Draft record for a withdrawal from `account`.
    pub fn withdrawal(account: AccountId, amount: Amount, balance_after: Amount) -> Self {
        Self {
            kind: RecordKind::Withdrawal,
            account,
            counterparty: None,
            correlation: None,
            amount,
            balance_after,
        }
    }

    /// Draft records for both halves of a transfer, linked by `correlation`.
    /// The first is the sender's debit, the second the receiver's credit.
    pub fn transfer_pair(
        correlation: CorrelationId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        from_balance: Amount,
        to_balance: Amount,
    ) -> (Self, Self) {
        let out = Self {
            kind: RecordKind::TransferOut,
            account: from,
            counterparty: Some(to),
            correlation: Some(correlation),
            amount,
            balance_after: from_balance,
        };
        let incoming = Self {
            kind: RecordKind::TransferIn,
            account: to,
            counterparty: Some(from),
            correlation: Some(correlation),
            amount,
            balance_after: to_balance,
        };
        (out, incoming)
    }
}
