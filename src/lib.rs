pub mod amount;
pub mod engine;
pub mod guard;
pub mod limiter;
pub mod log;
pub mod model;
pub mod session;
pub mod store;

pub use amount::Amount;
pub use engine::{ClosePolicy, Ledger, LedgerError, TransferOutcome};
pub use guard::{AccountLocks, Lease};
pub use limiter::RateLimiter;
pub use log::{MemoryLog, TransactionLog};
pub use model::{
    Account, AccountId, AccountStatus, CorrelationId, RecordId, RecordKind, TransactionRecord,
};
pub use store::{AccountStore, MemoryStore};
