//! Append-only transaction log.
//!
//! Every committed balance movement becomes one immutable record. Records
//! are never updated or deleted; identifiers and timestamps are assigned at
//! append time, so record ids are monotonically increasing in commit order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;

use crate::model::{AccountId, NewRecord, RecordId, TransactionRecord};

/// Error raised by a [`TransactionLog`] implementation.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("transaction log unavailable: {0}")]
    Unavailable(String),
}

/// Storage for the append-only history of committed movements.
///
/// Implementations are shared across tasks; all methods take `&self` and
/// must be internally synchronized.
pub trait TransactionLog: Send + Sync {
    /// Append a single record, assigning its id and timestamp.
    fn append(&self, record: NewRecord) -> Result<TransactionRecord, LogError>;

    /// Append both halves of a transfer as one atomic step. Either both
    /// records become visible or neither does; no reader may observe a
    /// lone half.
    fn append_transfer(
        &self,
        debit: NewRecord,
        credit: NewRecord,
    ) -> Result<(TransactionRecord, TransactionRecord), LogError>;

    /// Records touching `account`, newest first. Returns at most `limit`
    /// records; with `before`, only records whose id is strictly smaller,
    /// which makes repeated calls walk further into the past.
    fn list_for_account(
        &self,
        account: AccountId,
        limit: usize,
        before: Option<RecordId>,
    ) -> Result<Vec<TransactionRecord>, LogError>;
}

/// In-memory [`TransactionLog`] with a per-account position index.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<Journal>,
}

#[derive(Debug)]
struct Journal {
    records: Vec<TransactionRecord>,
    /// Positions into `records`, ascending, one list per account.
    by_account: HashMap<AccountId, Vec<usize>>,
    next_id: RecordId,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            by_account: HashMap::new(),
            next_id: 1,
        }
    }
}

impl Journal {
    fn commit(&mut self, record: NewRecord, timestamp: chrono::DateTime<Utc>) -> TransactionRecord {
        let id = self.next_id;
        self.next_id += 1;

        let committed = TransactionRecord {
            id,
            kind: record.kind,
            account: record.account,
            counterparty: record.counterparty,
            correlation: record.correlation,
            amount: record.amount,
            balance_after: record.balance_after,
            timestamp,
        };
        self.by_account
            .entry(committed.account)
            .or_default()
            .push(self.records.len());
        self.records.push(committed.clone());
        committed
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned journal means a writer panicked mid-append, so the data
    /// can no longer be trusted.
    fn journal(&self) -> Result<MutexGuard<'_, Journal>, LogError> {
        self.inner
            .lock()
            .map_err(|_| LogError::Unavailable("journal poisoned".into()))
    }
}

impl TransactionLog for MemoryLog {
    fn append(&self, record: NewRecord) -> Result<TransactionRecord, LogError> {
        let mut journal = self.journal()?;
        Ok(journal.commit(record, Utc::now()))
    }

    fn append_transfer(
        &self,
        debit: NewRecord,
        credit: NewRecord,
    ) -> Result<(TransactionRecord, TransactionRecord), LogError> {
        // One lock scope and one timestamp: the pair lands as a unit.
        let mut journal = self.journal()?;
        let now = Utc::now();
        let debit = journal.commit(debit, now);
        let credit = journal.commit(credit, now);
        Ok((debit, credit))
    }

    fn list_for_account(
        &self,
        account: AccountId,
        limit: usize,
        before: Option<RecordId>,
    ) -> Result<Vec<TransactionRecord>, LogError> {
        let journal = self.journal()?;
        let Some(positions) = journal.by_account.get(&account) else {
            return Ok(Vec::new());
        };
        Ok(positions
            .iter()
            .rev()
            .map(|&pos| &journal.records[pos])
            .filter(|record| before.is_none_or(|cursor| record.id < cursor))
            .take(limit)
            .cloned()
            .collect())
    }
}
