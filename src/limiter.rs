//! Per-account token-bucket rate limiter.
//!
//! A capability the caller layer holds and consults before invoking
//! balance-mutating operations; the ledger core itself never throttles.
//! Each account gets a bucket of `capacity` tokens that refills one token
//! per `refill_every` interval, so short bursts pass and sustained traffic
//! is spread out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::model::AccountId;

/// Token buckets keyed by account.
pub struct RateLimiter {
    capacity: u32,
    refill_every: Duration,
    buckets: Mutex<HashMap<AccountId, Bucket>>,
}

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The refill interval, which is also a sensible wait before retrying a
    /// throttled operation.
    pub fn refill_every(&self) -> Duration {
        self.refill_every
    }

    /// Take one token for `account`, returning whether the operation may
    /// proceed. New accounts start with a full bucket.
    pub fn try_acquire(&self, account: AccountId) -> bool {
        self.try_acquire_at(account, Instant::now())
    }

    fn try_acquire_at(&self, account: AccountId, now: Instant) -> bool {
        if self.refill_every.is_zero() {
            return true;
        }

        // Advisory state only, so a poisoned map is safe to keep using.
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(account).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refills = elapsed.as_nanos() / self.refill_every.as_nanos();
        if refills > 0 {
            if refills >= u128::from(self.capacity - bucket.tokens) {
                bucket.tokens = self.capacity;
                bucket.last_refill = now;
            } else {
                bucket.tokens += refills as u32;
                bucket.last_refill += self.refill_every * refills as u32;
            }
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}
