//! Account storage.
//!
//! The store owns account records and their lifecycle state. Money policy
//! (positive amounts, sufficient funds, locking) lives in the engine; the
//! store only guarantees existence, a valid close transition, and that no
//! balance is ever written to a closed account.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;

use crate::Amount;
use crate::model::{Account, AccountId, AccountStatus};

/// Error raised by an [`AccountStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("account {0} is closed")]
    Closed(AccountId),
    #[error("initial balance {0} is negative")]
    NegativeBalance(Amount),
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for account records.
///
/// Implementations are shared across tasks; all methods take `&self` and
/// must be internally synchronized.
pub trait AccountStore: Send + Sync {
    /// Create a new account and assign it the next sequential identifier.
    /// A negative initial balance fails `NegativeBalance`; zero is allowed.
    fn create(&self, owner: &str, initial_balance: Amount) -> Result<Account, StoreError>;

    /// Fetch a copy of an account. Closed accounts are returned; callers
    /// check `status`.
    fn get(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Overwrite an account's balance. Callers must hold the account's
    /// lease; the store only rejects unknown or closed accounts.
    fn update_balance(&self, id: AccountId, balance: Amount) -> Result<(), StoreError>;

    /// Mark an account closed and return its final state. Fails if the
    /// account is unknown or already closed.
    fn close(&self, id: AccountId) -> Result<Account, StoreError>;

    /// All accounts, ordered by identifier.
    fn list(&self) -> Result<Vec<Account>, StoreError>;
}

/// In-memory [`AccountStore`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Table>,
}

#[derive(Debug)]
struct Table {
    accounts: BTreeMap<AccountId, Account>,
    next_id: AccountId,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            accounts: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned table means a writer panicked mid-update, so the data can
    /// no longer be trusted.
    fn table(&self) -> Result<MutexGuard<'_, Table>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("account table poisoned".into()))
    }
}

impl AccountStore for MemoryStore {
    fn create(&self, owner: &str, initial_balance: Amount) -> Result<Account, StoreError> {
        if initial_balance < Amount::ZERO {
            return Err(StoreError::NegativeBalance(initial_balance));
        }

        let mut table = self.table()?;
        let id = table.next_id;
        table.next_id += 1;

        let account = Account {
            id,
            owner: owner.to_owned(),
            balance: initial_balance,
            created_at: Utc::now(),
            status: AccountStatus::Active,
        };
        table.accounts.insert(id, account.clone());
        Ok(account)
    }

    fn get(&self, id: AccountId) -> Result<Account, StoreError> {
        self.table()?
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn update_balance(&self, id: AccountId, balance: Amount) -> Result<(), StoreError> {
        let mut table = self.table()?;
        let account = table.accounts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if account.status == AccountStatus::Closed {
            return Err(StoreError::Closed(id));
        }
        account.balance = balance;
        Ok(())
    }

    fn close(&self, id: AccountId) -> Result<Account, StoreError> {
        let mut table = self.table()?;
        let account = table.accounts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if account.status == AccountStatus::Closed {
            return Err(StoreError::Closed(id));
        }
        account.status = AccountStatus::Closed;
        Ok(account.clone())
    }

    fn list(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.table()?.accounts.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let first = store.create("alice", Amount::ZERO).unwrap();
        let second = store.create("bob", Amount::ZERO).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn create_sets_initial_state() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::from_scaled(10_000)).unwrap();
        assert_eq!(account.owner, "alice");
        assert_eq!(account.balance, Amount::from_scaled(10_000));
        assert_eq!(account.status, AccountStatus::Active);
        assert!(account.is_active());
    }

    #[test]
    fn create_rejects_negative_initial_balance() {
        let store = MemoryStore::new();
        let result = store.create("alice", Amount::from_scaled(-1));
        assert!(matches!(result, Err(StoreError::NegativeBalance(_))));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn get_returns_stored_account() {
        let store = MemoryStore::new();
        let created = store.create("alice", Amount::from_scaled(500)).unwrap();
        let fetched = store.get(created.id).unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.balance, Amount::from_scaled(500));
    }

    #[test]
    fn get_unknown_account_fails() {
        let store = MemoryStore::new();
        assert!(matches!(store.get(42), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn get_returns_closed_accounts() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::ZERO).unwrap();
        store.close(account.id).unwrap();
        assert_eq!(store.get(account.id).unwrap().status, AccountStatus::Closed);
    }

    #[test]
    fn update_balance_persists() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::ZERO).unwrap();
        store
            .update_balance(account.id, Amount::from_scaled(777))
            .unwrap();
        assert_eq!(
            store.get(account.id).unwrap().balance,
            Amount::from_scaled(777)
        );
    }

    #[test]
    fn update_balance_unknown_account_fails() {
        let store = MemoryStore::new();
        let result = store.update_balance(9, Amount::ZERO);
        assert!(matches!(result, Err(StoreError::NotFound(9))));
    }

    #[test]
    fn update_balance_closed_account_fails() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::from_scaled(100)).unwrap();
        store.close(account.id).unwrap();

        let result = store.update_balance(account.id, Amount::ZERO);
        assert!(matches!(result, Err(StoreError::Closed(id)) if id == account.id));
        assert_eq!(
            store.get(account.id).unwrap().balance,
            Amount::from_scaled(100)
        );
    }

    #[test]
    fn close_marks_account_closed() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::ZERO).unwrap();
        let closed = store.close(account.id).unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);
        assert_eq!(store.get(account.id).unwrap().status, AccountStatus::Closed);
    }

    #[test]
    fn close_twice_fails() {
        let store = MemoryStore::new();
        let account = store.create("alice", Amount::ZERO).unwrap();
        store.close(account.id).unwrap();
        let result = store.close(account.id);
        assert!(matches!(result, Err(StoreError::Closed(id)) if id == account.id));
    }

    #[test]
    fn list_returns_accounts_in_id_order() {
        let store = MemoryStore::new();
        store.create("alice", Amount::ZERO).unwrap();
        store.create("bob", Amount::ZERO).unwrap();
        store.create("carol", Amount::ZERO).unwrap();

        let ids: Vec<_> = store.list().unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
