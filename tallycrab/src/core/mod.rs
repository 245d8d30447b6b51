//! Core components of the tallycrab rate limiting library
//!
//! This module contains the fundamental building blocks:
//! - [`store`]: the [`CounterStore`] contract and the in-memory backend
//! - [`fixed_window`], [`sliding_window`], [`token_bucket`]: the three limiters
//! - [`limiter`]: the [`Limiter`] trait and the [`Decision`] they return
//! - [`rate`]: refill rates for token buckets
//! - [`policy`]: fail-open / fail-closed handling of store failures

pub mod fixed_window;
pub mod limiter;
pub mod policy;
pub mod rate;
pub mod sliding_window;
pub mod store;
pub mod token_bucket;

#[cfg(feature = "serde")]
pub mod config;

#[cfg(test)]
mod tests;

pub use fixed_window::FixedWindow;
pub use limiter::{Decision, Limiter};
pub use policy::FailurePolicy;
pub use rate::Rate;
pub use sliding_window::SlidingWindow;
pub use store::{
    BucketSpend, BucketState, CounterStore, MemoryStore, MemoryStoreBuilder, SpendOutcome,
    StoreError, WindowAdmission, WindowEntry,
};
pub use token_bucket::TokenBucket;

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during rate limiting operations
///
/// # Variants
///
/// - [`StoreUnavailable`](LimitError::StoreUnavailable): the backing store failed;
///   the caller decides whether to retry, fail open or fail closed
/// - [`InvalidConfiguration`](LimitError::InvalidConfiguration): a limiter parameter
///   or per-call cost is out of range
///
/// # Example
///
/// ```
/// use tallycrab::{LimitError, MemoryStore, TokenBucket};
///
/// // A bucket cannot be built with a zero capacity
/// match TokenBucket::new(MemoryStore::new(), 0.0, 1.0) {
///     Err(LimitError::InvalidConfiguration(reason)) => println!("rejected: {reason}"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimitError {
    /// The backing store could not complete an operation
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Limiter parameters or call arguments are out of range
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl LimitError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        LimitError::InvalidConfiguration(reason.into())
    }
}

/// Largest window, in seconds, whose length still fits in signed nanoseconds
pub(crate) const MAX_WINDOW_SECS: u64 = i64::MAX as u64 / 1_000_000_000;

pub(crate) fn unix_nanos(now: SystemTime) -> Result<i64, LimitError> {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos().min(i64::MAX as u128) as i64)
        .map_err(|_| LimitError::invalid("clock reading precedes the Unix epoch"))
}

pub(crate) fn unix_micros(now: SystemTime) -> Result<i64, LimitError> {
    Ok(unix_nanos(now)? / 1_000)
}
