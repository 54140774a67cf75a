//! Ledger engine.
//!
//! Coordinates the account store, the append-only transaction log, and the
//! per-account lock registry. Every balance mutation follows one shape:
//! validate, acquire the lease, read, check, write balances, append records.
//! Records land last, so a storage fault after a balance write triggers a
//! rollback before the error surfaces, and no caller ever observes a
//! half-applied operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{error, info};

use crate::Amount;
use crate::guard::AccountLocks;
use crate::log::{MemoryLog, TransactionLog};
use crate::model::{Account, AccountId, CorrelationId, NewRecord, RecordId, TransactionRecord};
use crate::store::{AccountStore, MemoryStore};

mod error;
pub use error::LedgerError;

/// What `close_account` requires of the remaining balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Close regardless of balance; remaining funds stay on record.
    #[default]
    AllowRemainingBalance,
    /// Refuse to close while funds remain.
    RequireZeroBalance,
}

/// Result of a committed transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferOutcome {
    /// Shared by the transfer's two log records.
    pub correlation: CorrelationId,
    /// Sender balance after the debit.
    pub from_balance: Amount,
    /// Receiver balance after the credit.
    pub to_balance: Amount,
}

/// The ledger engine.
///
/// Generic over its storage collaborators so alternative backends (and the
/// fault-injecting test doubles) plug in at the trait seams;
/// [`Ledger::in_memory`] wires the bundled implementations. All operations
/// take `&self`, so one engine instance is shared by concurrent callers.
pub struct Ledger<S = MemoryStore, L = MemoryLog> {
    store: S,
    log: L,
    locks: AccountLocks,
    correlations: AtomicU64,
    close_policy: ClosePolicy,
}

impl Ledger {
    /// Ledger over fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), MemoryLog::new())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Public API
impl<S: AccountStore, L: TransactionLog> Ledger<S, L> {
    pub fn new(store: S, log: L) -> Self {
        Self {
            store,
            log,
            locks: AccountLocks::new(),
            correlations: AtomicU64::new(1),
            close_policy: ClosePolicy::default(),
        }
    }

    /// Replace the default bound on lock waits.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.locks = AccountLocks::with_wait(wait);
        self
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    /// Open a new account. The initial balance may be zero; it produces no
    /// transaction record either way.
    pub fn open_account(&self, owner: &str, initial_balance: Amount) -> Result<Account, LedgerError> {
        let result = self.store.create(owner, initial_balance).map_err(LedgerError::from);
        match &result {
            Ok(account) => info!(
                account = %account.id,
                owner = %account.owner,
                balance = %account.balance,
                "account opened"
            ),
            Err(e) => info!(owner = %owner, reason = %e, "open rejected"),
        }
        result
    }

    /// Current details of one account. Works on closed accounts.
    pub fn account(&self, account: AccountId) -> Result<Account, LedgerError> {
        Ok(self.store.get(account)?)
    }

    /// All accounts, ordered by id.
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.list()?)
    }

    /// Credit `amount` to the account and return the new balance.
    pub async fn deposit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let result = self.apply_deposit(account, amount).await;
        Self::log_result("deposit", account, Some(amount), &result);
        result
    }

    /// Debit `amount` from the account and return the new balance.
    pub async fn withdraw(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        let result = self.apply_withdrawal(account, amount).await;
        Self::log_result("withdrawal", account, Some(amount), &result);
        result
    }

    /// Move `amount` between two accounts as one atomic step: both balances
    /// move and two linked records land in the log, or nothing happens.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferOutcome, LedgerError> {
        let result = self.apply_transfer(from, to, amount).await;
        match &result {
            Ok(outcome) => info!(
                from = %from,
                to = %to,
                amount = %amount,
                correlation = %outcome.correlation,
                "transfer applied"
            ),
            Err(e) => info!(from = %from, to = %to, amount = %amount, reason = %e, "transfer rejected"),
        }
        result
    }

    /// Records touching the account, newest first, at most `limit` long.
    /// With `before`, only records older than that id are returned, so
    /// repeated calls page backwards through history.
    ///
    /// Takes no lease: the log's pair append is atomic, so a reader can
    /// never observe half a transfer, and reads never fail `Busy`.
    pub fn history(
        &self,
        account: AccountId,
        limit: usize,
        before: Option<RecordId>,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.store.get(account)?;
        Ok(self.log.list_for_account(account, limit, before)?)
    }

    /// Close the account and return its final state. No record is appended;
    /// closure is not a money movement.
    pub async fn close_account(&self, account: AccountId) -> Result<Account, LedgerError> {
        let result = self.apply_close(account).await;
        Self::log_result("close", account, None, &result);
        result
    }
}

/// Private API
impl<S: AccountStore, L: TransactionLog> Ledger<S, L> {
    /// Small helper to log operation results
    fn log_result<T>(
        op: &str,
        account: AccountId,
        amount: Option<Amount>,
        result: &Result<T, LedgerError>,
    ) {
        match (result, amount) {
            (Ok(_), Some(amt)) => {
                info!(account = %account, amount = %amt, "{op} applied");
            }
            (Ok(_), None) => {
                info!(account = %account, "{op} applied");
            }
            (Err(e), Some(amt)) => {
                info!(account = %account, amount = %amt, reason = %e, "{op} rejected");
            }
            (Err(e), None) => {
                info!(account = %account, reason = %e, "{op} rejected");
            }
        }
    }

    /// Restore a balance after a downstream failure. The lease is still
    /// held, so no other operation can have observed the intermediate value.
    fn roll_back_balance(&self, account: AccountId, balance: Amount) {
        if let Err(e) = self.store.update_balance(account, balance) {
            error!(
                account = %account,
                balance = %balance,
                reason = %e,
                "balance rollback failed, stored state is inconsistent"
            );
        }
    }

    async fn apply_deposit(&self, account: AccountId, amount: Amount) -> Result<Amount, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let _lease = self.locks.acquire(&[account]).await?;

        let current = self.store.get(account)?;
        if !current.is_active() {
            return Err(LedgerError::InvalidState(account, "account is closed"));
        }
        let balance = current
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        self.store.update_balance(account, balance)?;
        if let Err(e) = self.log.append(NewRecord::deposit(account, amount, balance)) {
            self.roll_back_balance(account, current.balance);
            return Err(e.into());
        }
        Ok(balance)
    }

    async fn apply_withdrawal(
        &self,
        account: AccountId,
        amount: Amount,
    ) -> Result<Amount, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let _lease = self.locks.acquire(&[account]).await?;

        let current = self.store.get(account)?;
        if !current.is_active() {
            return Err(LedgerError::InvalidState(account, "account is closed"));
        }
        if current.balance < amount {
            return Err(LedgerError::InsufficientFunds(account, current.balance, amount));
        }
        let balance = current.balance - amount;

        self.store.update_balance(account, balance)?;
        if let Err(e) = self.log.append(NewRecord::withdrawal(account, amount, balance)) {
            self.roll_back_balance(account, current.balance);
            return Err(e.into());
        }
        Ok(balance)
    }

    async fn apply_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferOutcome, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if from == to {
            return Err(LedgerError::InvalidTransfer(from));
        }

        // Both locks as one unit; the guard orders them internally.
        let _lease = self.locks.acquire(&[from, to]).await?;

        let sender = self.store.get(from)?;
        if !sender.is_active() {
            return Err(LedgerError::InvalidState(from, "account is closed"));
        }
        let receiver = self.store.get(to)?;
        if !receiver.is_active() {
            return Err(LedgerError::InvalidState(to, "account is closed"));
        }

        if sender.balance < amount {
            return Err(LedgerError::InsufficientFunds(from, sender.balance, amount));
        }
        let from_balance = sender.balance - amount;
        let to_balance = receiver
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        // Debit, credit, then log; unwind in reverse on any failure.
        self.store.update_balance(from, from_balance)?;
        if let Err(e) = self.store.update_balance(to, to_balance) {
            self.roll_back_balance(from, sender.balance);
            return Err(e.into());
        }

        let correlation = self.correlations.fetch_add(1, Ordering::Relaxed);
        let (debit, credit) =
            NewRecord::transfer_pair(correlation, from, to, amount, from_balance, to_balance);
        if let Err(e) = self.log.append_transfer(debit, credit) {
            self.roll_back_balance(to, receiver.balance);
            self.roll_back_balance(from, sender.balance);
            return Err(e.into());
        }

        Ok(TransferOutcome {
            correlation,
            from_balance,
            to_balance,
        })
    }

    async fn apply_close(&self, account: AccountId) -> Result<Account, LedgerError> {
        let _lease = self.locks.acquire(&[account]).await?;

        let current = self.store.get(account)?;
        if !current.is_active() {
            return Err(LedgerError::InvalidState(account, "account is already closed"));
        }
        if self.close_policy == ClosePolicy::RequireZeroBalance && current.balance != Amount::ZERO {
            return Err(LedgerError::InvalidState(account, "balance must be zero to close"));
        }
        Ok(self.store.close(account)?)
    }
}
