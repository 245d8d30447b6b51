//! Fixed-window counting
//!
//! Time is cut into consecutive windows of equal length. Each key gets one
//! counter per window and requests are allowed while the counter stays at or
//! below the limit. A burst at the end of one window followed by a burst at
//! the start of the next can let up to twice the limit through in a short
//! span; that is the price of a single counter per key.

use super::store::CounterStore;
use super::{Decision, LimitError, Limiter, MAX_WINDOW_SECS, unix_nanos};
use std::time::{Duration, SystemTime};

const DEFAULT_NAMESPACE: &str = "fixed";

/// Fixed-window rate limiter
///
/// # Example
///
/// ```
/// use tallycrab::{FixedWindow, Limiter, MemoryStore};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// // 3 requests per minute
/// let limiter = FixedWindow::new(MemoryStore::new(), 3, 60)?;
/// let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_040);
///
/// for _ in 0..3 {
///     assert!(limiter.allow_at("user:123", t0)?);
/// }
/// assert!(!limiter.allow_at("user:123", t0)?);
///
/// // The next window starts from zero
/// assert!(limiter.allow_at("user:123", t0 + Duration::from_secs(60))?);
/// # Ok::<(), tallycrab::LimitError>(())
/// ```
#[derive(Debug)]
pub struct FixedWindow<S> {
    store: S,
    limit: u64,
    window: Duration,
    namespace: String,
}

impl<S: CounterStore> FixedWindow<S> {
    /// Create a limiter allowing `limit` requests per `window_seconds`
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] if `limit` or `window_seconds` is
    /// zero, or the window is too long to express in nanoseconds.
    pub fn new(store: S, limit: u64, window_seconds: u64) -> Result<Self, LimitError> {
        validate(limit, window_seconds)?;

        Ok(FixedWindow {
            store,
            limit,
            window: Duration::from_secs(window_seconds),
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    /// Prefix store keys with `namespace` instead of `"fixed"`
    ///
    /// Limiters sharing a store need distinct namespaces to keep their
    /// counters apart.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

pub(crate) fn validate(limit: u64, window_seconds: u64) -> Result<(), LimitError> {
    if limit == 0 {
        return Err(LimitError::invalid("limit must be positive"));
    }
    if window_seconds == 0 || window_seconds > MAX_WINDOW_SECS {
        return Err(LimitError::invalid(format!(
            "window must be between 1 and {MAX_WINDOW_SECS} seconds, got {window_seconds}"
        )));
    }
    Ok(())
}

impl<S: CounterStore> Limiter for FixedWindow<S> {
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError> {
        let now_ns = unix_nanos(now)?;
        let window_ns = self.window.as_nanos() as i64;
        let window_id = now_ns.div_euclid(window_ns);

        let store_key = format!("{}:{}:{}", self.namespace, key, window_id);
        let count = self
            .store
            .increment_and_expire(&store_key, self.window, now)?;

        let remaining = self.limit.saturating_sub(count);
        if count <= self.limit {
            tracing::trace!(key, window_id, count, "fixed window allowed");
            return Ok(Decision::allowed(self.limit, remaining));
        }

        let next_window_ns = window_id.saturating_add(1).saturating_mul(window_ns);
        let retry_after = Duration::from_nanos(next_window_ns.saturating_sub(now_ns) as u64);
        tracing::debug!(key, window_id, count, limit = self.limit, "fixed window exhausted");
        Ok(Decision::denied(self.limit, remaining, retry_after))
    }
}
