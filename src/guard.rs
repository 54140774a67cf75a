//! Per-account concurrency guard.
//!
//! Every balance-mutating operation takes a [`Lease`] on the accounts it
//! touches before reading them. Locks are always taken in ascending account
//! order, so two operations can never hold a lock the other is waiting for.
//! The whole acquisition shares one deadline; exceeding it surfaces as
//! [`GuardError::Busy`] and releases everything taken so far.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::time::{Instant, timeout_at};

use crate::model::AccountId;

/// Upper bound on how long an operation may wait for its locks.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Error raised when a lease cannot be acquired in time.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("timed out waiting for account {0}")]
    Busy(AccountId),
}

/// Registry of per-account locks.
///
/// Lock handles are created on first use and live for the registry's
/// lifetime. The waiters queue fairly, so a steady stream of short
/// operations cannot starve a waiting one indefinitely.
pub struct AccountLocks {
    wait: Duration,
    table: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive hold on a set of accounts, released on drop.
#[must_use = "dropping the lease releases the accounts immediately"]
#[derive(Debug)]
pub struct Lease {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::with_wait(DEFAULT_LOCK_WAIT)
    }

    pub fn with_wait(wait: Duration) -> Self {
        Self {
            wait,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Take the locks for every given account, in ascending order, under one
    /// deadline. Duplicates are collapsed. On timeout the partial set is
    /// released and the blocking account is reported.
    pub async fn acquire(&self, accounts: &[AccountId]) -> Result<Lease, GuardError> {
        let mut ids = accounts.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let deadline = Instant::now() + self.wait;
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let guard = timeout_at(deadline, self.handle(id).lock_owned())
                .await
                .map_err(|_| GuardError::Busy(id))?;
            guards.push(guard);
        }
        Ok(Lease { _guards: guards })
    }

    /// The table only holds `Arc` handles, so a poisoned flag never hides
    /// corrupted state and can be cleared.
    fn handle(&self, id: AccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(id).or_default().clone()
    }
}

impl Default for AccountLocks {
    fn default() -> Self {
        Self::new()
    }
}
