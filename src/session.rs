//! Csv session parsing and replay.
//!
//! A session file drives the ledger, one row per command, applied in order.
//! Rows that fail to parse and commands the ledger rejects are logged and
//! skipped so a single bad row cannot end the session.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::{
    Account, AccountId, AccountStore, Amount, Ledger, LedgerError, RateLimiter, TransactionLog,
    TransactionRecord,
};

/// Records returned per history command.
const HISTORY_PAGE: usize = 10;

/// Attempts at a retryable failure before the command is dropped.
const RETRY_ATTEMPTS: u32 = 3;

/// Pause between attempts at a retryable failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Refill intervals waited on a throttled account before the command is
/// dropped.
const THROTTLE_ATTEMPTS: u32 = 3;

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: &'static str,
        field: &'static str,
    },
}

/// One command of a replayed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open {
        owner: String,
        initial_balance: Amount,
    },
    Deposit {
        account: AccountId,
        amount: Amount,
    },
    Withdraw {
        account: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    History {
        account: AccountId,
    },
    Close {
        account: AccountId,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    account: Option<AccountId>,
    to: Option<AccountId>,
    amount: Option<Amount>,
    owner: Option<String>,
}

fn require<T>(
    value: Option<T>,
    line: usize,
    op: &'static str,
    field: &'static str,
) -> Result<T, SessionError> {
    value.ok_or(SessionError::MissingField { line, op, field })
}

fn command_from_row(row: InputRow, line: usize) -> Result<Command, SessionError> {
    match row.op.as_str() {
        "open" => Ok(Command::Open {
            owner: require(row.owner, line, "open", "owner")?,
            initial_balance: row.amount.unwrap_or(Amount::ZERO),
        }),
        "deposit" => Ok(Command::Deposit {
            account: require(row.account, line, "deposit", "account")?,
            amount: require(row.amount, line, "deposit", "amount")?,
        }),
        "withdraw" => Ok(Command::Withdraw {
            account: require(row.account, line, "withdraw", "account")?,
            amount: require(row.amount, line, "withdraw", "amount")?,
        }),
        "transfer" => Ok(Command::Transfer {
            from: require(row.account, line, "transfer", "account")?,
            to: require(row.to, line, "transfer", "to")?,
            amount: require(row.amount, line, "transfer", "amount")?,
        }),
        "history" => Ok(Command::History {
            account: require(row.account, line, "history", "account")?,
        }),
        "close" => Ok(Command::Close {
            account: require(row.account, line, "close", "account")?,
        }),
        _ => Err(SessionError::UnrecognizedOp { line, op: row.op }),
    }
}

/// Read session commands from a csv file
pub fn read_commands(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<Command, SessionError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open session file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| SessionError::Parse { line, source })?;
            command_from_row(row, line)
        })
}

/// Apply a stream of session commands against the ledger.
///
/// Commands arrive as a stream so the session can be applied while the file
/// is still being parsed. History pages are written to `out` as they are
/// produced; the final account state is written separately once the stream
/// ends.
pub async fn run<S, L, W>(
    ledger: &Ledger<S, L>,
    limiter: &RateLimiter,
    mut commands: impl Stream<Item = Command> + Unpin,
    out: W,
) where
    S: AccountStore,
    L: TransactionLog,
    W: io::Write,
{
    let mut writer = csv::Writer::from_writer(out);

    while let Some(command) = commands.next().await {
        apply(ledger, limiter, command, &mut writer).await;
    }

    writer.flush().expect("failed to flush csv writer");
}

async fn apply<S, L, W>(
    ledger: &Ledger<S, L>,
    limiter: &RateLimiter,
    command: Command,
    writer: &mut csv::Writer<W>,
) where
    S: AccountStore,
    L: TransactionLog,
    W: io::Write,
{
    match command {
        Command::Open {
            owner,
            initial_balance,
        } => {
            // Opening is not rate limited; the account does not exist yet.
            if let Err(e) = ledger.open_account(&owner, initial_balance) {
                warn!(owner = %owner, reason = %e, "open dropped");
            }
        }
        Command::Deposit { account, amount } => {
            if wait_for_limiter(limiter, account, "deposit").await {
                retrying(account, "deposit", || ledger.deposit(account, amount)).await;
            }
        }
        Command::Withdraw { account, amount } => {
            if wait_for_limiter(limiter, account, "withdrawal").await {
                retrying(account, "withdrawal", || ledger.withdraw(account, amount)).await;
            }
        }
        Command::Transfer { from, to, amount } => {
            if wait_for_limiter(limiter, from, "transfer").await {
                retrying(from, "transfer", || ledger.transfer(from, to, amount)).await;
            }
        }
        Command::History { account } => match ledger.history(account, HISTORY_PAGE, None) {
            Ok(records) => write_history(account, &records, writer),
            Err(e) => warn!(account = %account, reason = %e, "history rejected"),
        },
        Command::Close { account } => {
            retrying(account, "close", || ledger.close_account(account)).await;
        }
    }
}

/// Hold a throttled command through a few refill intervals before dropping
/// it.
async fn wait_for_limiter(limiter: &RateLimiter, account: AccountId, op: &str) -> bool {
    let mut attempts = 0;
    while !limiter.try_acquire(account) {
        if attempts == THROTTLE_ATTEMPTS {
            warn!(account = %account, "{op} rate limited, dropped");
            return false;
        }
        attempts += 1;
        tokio::time::sleep(limiter.refill_every()).await;
    }
    true
}

/// Apply one ledger call, retrying briefly when the failure is retryable.
/// The ledger logs its own outcomes; only the final rejection is repeated
/// here with the session in mind.
async fn retrying<T, F, Fut>(account: AccountId, op: &str, call: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempts = 0;
    loop {
        match call().await {
            Ok(_) => return,
            Err(e) if e.is_retryable() && attempts < RETRY_ATTEMPTS => {
                attempts += 1;
                debug!(account = %account, reason = %e, "{op} retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => {
                warn!(account = %account, reason = %e, "{op} dropped");
                return;
            }
        }
    }
}

fn write_history<W: io::Write>(
    account: AccountId,
    records: &[TransactionRecord],
    writer: &mut csv::Writer<W>,
) {
    for record in records {
        let counterparty = record
            .counterparty
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        writer
            .write_record([
                "history".to_string(),
                account.to_string(),
                record.id.to_string(),
                record.kind.to_string(),
                record.amount.to_string(),
                counterparty,
                record.balance_after.to_string(),
            ])
            .expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

/// Write final account state to stdout in csv format
pub fn write_accounts(accounts: impl IntoIterator<Item = Account>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for account in accounts {
        writer
            .write_record([
                "account".to_string(),
                account.id.to_string(),
                account.owner,
                account.balance.to_string(),
                account.status.to_string(),
            ])
            .expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
