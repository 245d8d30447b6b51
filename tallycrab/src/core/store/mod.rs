//! Storage backends for limiter state
//!
//! Every limiter in this crate is stateless: all counters, timestamp sets and
//! bucket states live in a [`CounterStore`]. A store only has to provide a
//! handful of atomic primitives, so the same limiters run against the
//! in-process [`MemoryStore`] or a networked cache such as Redis.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;


#[cfg(test)]
mod tests_builders;

mod memory;
mod ordered_set;

pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use ordered_set::OrderedSet;

/// Lost compare-and-set races tolerated by the default
/// [`CounterStore::spend_from_bucket`] before it gives up
pub const MAX_CAS_ATTEMPTS: u32 = 64;

/// Errors a [`CounterStore`] can report
///
/// Limiters never retry or swallow these; they surface as
/// [`LimitError::StoreUnavailable`](crate::LimitError::StoreUnavailable).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend could not be reached or did not complete the operation
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The key already holds a different kind of value
    #[error("key {key:?} holds a value of a different kind")]
    WrongType { key: String },

    /// A stored value could not be decoded
    #[error("corrupt value under {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    /// An optimistic update kept losing races to concurrent writers
    #[error("compare-and-set lost {attempts} consecutive races")]
    Contention { attempts: u32 },
}

/// Persisted token-bucket state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Tokens available after the last refill, never negative
    pub tokens: f64,
    /// Time of the last refill in nanoseconds since the Unix epoch
    pub last_refill_ns: i64,
}

/// One token-bucket spend attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSpend {
    pub capacity: f64,
    /// Refill rate in tokens per second
    pub tokens_per_second: f64,
    pub cost: f64,
    /// Request time in nanoseconds since the Unix epoch
    pub now_ns: i64,
    /// Expiry for the written bucket; `None` keeps it forever
    pub ttl: Option<Duration>,
}

/// Outcome of [`CounterStore::spend_from_bucket`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendOutcome {
    pub allowed: bool,
    /// Tokens left in the bucket after the attempt
    pub tokens: f64,
}

impl BucketSpend {
    /// Refill `current` up to now and try to take `cost` from it
    ///
    /// A missing bucket starts full. A clock reading older than the stored
    /// refill time earns nothing and leaves the refill time where it is, so
    /// the same gap is never credited twice.
    pub fn apply(&self, current: Option<BucketState>) -> (SpendOutcome, BucketState) {
        let (tokens, last_refill_ns) = match current {
            Some(state) => (state.tokens, state.last_refill_ns),
            None => (self.capacity, self.now_ns),
        };

        let elapsed = self.now_ns.saturating_sub(last_refill_ns).max(0) as f64 / 1e9;
        let refilled = (tokens + elapsed * self.tokens_per_second).min(self.capacity);
        let allowed = refilled >= self.cost;
        let next = BucketState {
            tokens: if allowed { refilled - self.cost } else { refilled },
            last_refill_ns: self.now_ns.max(last_refill_ns),
        };

        (
            SpendOutcome {
                allowed,
                tokens: next.tokens,
            },
            next,
        )
    }
}

/// One sliding-window admission attempt
///
/// Scores are timestamps in microseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    /// Unique member name for this request
    pub member: String,
    /// Score of the new member (the request time)
    pub score: i64,
    /// Members scored strictly below this are pruned first
    pub min_score: i64,
    /// Maximum number of members the window may hold
    pub limit: u64,
}

/// Outcome of [`CounterStore::admit_to_window`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAdmission {
    /// Members stored after the operation
    pub count: u64,
    /// Whether the new member was kept
    pub admitted: bool,
    /// Lowest score still stored, if any
    pub oldest_score: Option<i64>,
}

/// Atomic primitives the limiters are built on
///
/// Implementations are shared between threads, so every method takes `&self`
/// and must be atomic with respect to concurrent callers on the same key.
/// `now` is the caller's clock reading and drives expiry bookkeeping for
/// stores that track expiry themselves.
pub trait CounterStore: Send + Sync {
    /// Increment the counter under `key` and return the new value
    ///
    /// A counter that does not exist (or has expired) is created at 1 with an
    /// expiry of `ttl`. Existing counters keep their expiry.
    fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<u64, StoreError>;

    /// Prune, insert, count and conditionally revoke as one atomic unit
    ///
    /// Removes members scored below `entry.min_score`, adds `entry.member`,
    /// counts the set and removes the new member again if the count exceeds
    /// `entry.limit`. The set's expiry is refreshed to `ttl`.
    fn admit_to_window(
        &self,
        key: &str,
        entry: WindowEntry,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<WindowAdmission, StoreError>;

    /// Load the bucket stored under `key`
    fn load_bucket(&self, key: &str, now: SystemTime) -> Result<Option<BucketState>, StoreError>;

    /// Replace the bucket under `key` if it still equals `expected`
    ///
    /// `expected = None` only succeeds when no live bucket exists. `ttl` sets
    /// the entry's expiry; `None` keeps it forever.
    fn compare_and_set_bucket(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
        ttl: Option<Duration>,
        now: SystemTime,
    ) -> Result<bool, StoreError>;

    /// Refill the bucket under `key` and try to spend from it, atomically
    ///
    /// The default runs [`BucketSpend::apply`] in a load / compare-and-set
    /// loop and fails with [`StoreError::Contention`] after
    /// [`MAX_CAS_ATTEMPTS`] lost races. Stores that can run the whole step
    /// server-side or under one lock override it.
    fn spend_from_bucket(
        &self,
        key: &str,
        spend: BucketSpend,
        now: SystemTime,
    ) -> Result<SpendOutcome, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.load_bucket(key, now)?;
            let (outcome, next) = spend.apply(current);
            if self.compare_and_set_bucket(key, current, next, spend.ttl, now)? {
                return Ok(outcome);
            }
        }

        tracing::warn!(
            key,
            attempts = MAX_CAS_ATTEMPTS,
            "token bucket update kept losing compare-and-set races"
        );
        Err(StoreError::Contention {
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

macro_rules! forward_counter_store {
    ($($ty:ty),*) => {
        $(
            impl<S: CounterStore + ?Sized> CounterStore for $ty {
                fn increment_and_expire(
                    &self,
                    key: &str,
                    ttl: Duration,
                    now: SystemTime,
                ) -> Result<u64, StoreError> {
                    (**self).increment_and_expire(key, ttl, now)
                }

                fn admit_to_window(
                    &self,
                    key: &str,
                    entry: WindowEntry,
                    ttl: Duration,
                    now: SystemTime,
                ) -> Result<WindowAdmission, StoreError> {
                    (**self).admit_to_window(key, entry, ttl, now)
                }

                fn load_bucket(
                    &self,
                    key: &str,
                    now: SystemTime,
                ) -> Result<Option<BucketState>, StoreError> {
                    (**self).load_bucket(key, now)
                }

                fn compare_and_set_bucket(
                    &self,
                    key: &str,
                    expected: Option<BucketState>,
                    new: BucketState,
                    ttl: Option<Duration>,
                    now: SystemTime,
                ) -> Result<bool, StoreError> {
                    (**self).compare_and_set_bucket(key, expected, new, ttl, now)
                }

                fn spend_from_bucket(
                    &self,
                    key: &str,
                    spend: BucketSpend,
                    now: SystemTime,
                ) -> Result<SpendOutcome, StoreError> {
                    (**self).spend_from_bucket(key, spend, now)
                }
            }
        )*
    };
}

forward_counter_store!(&S, Arc<S>, Box<S>);
