//! The interface shared by every limiter
//!
//! All three strategies answer the same question for a key at a point in
//! time, so they implement one object-safe trait and can be mixed behind
//! `Box<dyn Limiter>`.

use super::LimitError;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Result of a rate limit check
///
/// Contains information about the current state of the limiter for a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// The configured limit (requests per window, or bucket capacity)
    pub limit: u64,
    /// The number of requests remaining after this one
    pub remaining: u64,
    /// Time to wait before the next request can be allowed (0 if this one was)
    pub retry_after: Duration,
}

impl Decision {
    pub(crate) fn allowed(limit: u64, remaining: u64) -> Self {
        Decision {
            allowed: true,
            limit,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    pub(crate) fn denied(limit: u64, remaining: u64, retry_after: Duration) -> Self {
        Decision {
            allowed: false,
            limit,
            remaining,
            retry_after,
        }
    }
}

/// A rate limiter keyed by caller-supplied strings
///
/// Implementors keep no per-key state of their own; every call is one atomic
/// unit of work against the limiter's store. Only [`check_at`](Limiter::check_at)
/// is required; the other methods read the system clock or drop the details.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tallycrab::{FixedWindow, Limiter, MemoryStore, SlidingWindow, TokenBucket};
///
/// let store = Arc::new(MemoryStore::new());
/// let limiters: Vec<Box<dyn Limiter>> = vec![
///     Box::new(FixedWindow::new(store.clone(), 10, 60)?),
///     Box::new(SlidingWindow::new(store.clone(), 10, 60.0)?),
///     Box::new(TokenBucket::new(store, 10.0, 0.5)?),
/// ];
///
/// for limiter in &limiters {
///     assert!(limiter.allow("user:42")?);
/// }
/// # Ok::<(), tallycrab::LimitError>(())
/// ```
pub trait Limiter: Send + Sync {
    /// Check and record one request for `key` at time `now`
    ///
    /// # Errors
    ///
    /// - [`LimitError::StoreUnavailable`]: the store failed; nothing is retried
    /// - [`LimitError::InvalidConfiguration`]: `now` precedes the Unix epoch
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError>;

    /// Check and record one request for `key` now
    fn check(&self, key: &str) -> Result<Decision, LimitError> {
        self.check_at(key, SystemTime::now())
    }

    /// Whether a request for `key` at `now` is allowed
    fn allow_at(&self, key: &str, now: SystemTime) -> Result<bool, LimitError> {
        Ok(self.check_at(key, now)?.allowed)
    }

    /// Whether a request for `key` is allowed now
    fn allow(&self, key: &str) -> Result<bool, LimitError> {
        self.allow_at(key, SystemTime::now())
    }
}

impl<L: Limiter + ?Sized> Limiter for Box<L> {
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError> {
        (**self).check_at(key, now)
    }
}

impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError> {
        (**self).check_at(key, now)
    }
}
