//! Sliding-window log
//!
//! Each key owns a score-ordered set of request timestamps. A check prunes
//! timestamps older than the window, records the new request, counts what is
//! left and takes the request back out again if that count exceeds the
//! limit. The store runs those steps as one atomic unit, so denied requests
//! never occupy a slot and concurrent callers never see a half-applied check.

use super::store::{CounterStore, WindowEntry};
use super::{Decision, LimitError, Limiter, MAX_WINDOW_SECS, unix_micros};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

const DEFAULT_NAMESPACE: &str = "sliding";

/// Sliding-window rate limiter
///
/// Timestamps are kept with microsecond precision and the window may be a
/// fractional number of seconds.
///
/// # Example
///
/// ```
/// use tallycrab::{Limiter, MemoryStore, SlidingWindow};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// // 2 requests per 10 seconds
/// let limiter = SlidingWindow::new(MemoryStore::new(), 2, 10.0)?;
/// let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
///
/// assert!(limiter.allow_at("ip:10.0.0.1", t0)?);
/// assert!(limiter.allow_at("ip:10.0.0.1", t0 + Duration::from_secs(5))?);
/// assert!(!limiter.allow_at("ip:10.0.0.1", t0 + Duration::from_secs(8))?);
/// // The request at t0 has left the window
/// assert!(limiter.allow_at("ip:10.0.0.1", t0 + Duration::from_secs(11))?);
/// # Ok::<(), tallycrab::LimitError>(())
/// ```
#[derive(Debug)]
pub struct SlidingWindow<S> {
    store: S,
    limit: u64,
    window: Duration,
    window_us: i64,
    namespace: String,
    // Member names are "{score}-{nonce}-{seq}" so equal timestamps never collide
    nonce: u64,
    seq: AtomicU64,
}

impl<S: CounterStore> SlidingWindow<S> {
    /// Create a limiter allowing `limit` requests in any `window_seconds` span
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] if `limit` is zero or
    /// `window_seconds` is not a positive, finite number of at least one
    /// microsecond.
    pub fn new(store: S, limit: u64, window_seconds: f64) -> Result<Self, LimitError> {
        let window = validate(limit, window_seconds)?;

        Ok(SlidingWindow {
            store,
            limit,
            window,
            window_us: window.as_micros() as i64,
            namespace: DEFAULT_NAMESPACE.to_string(),
            nonce: rand::random(),
            seq: AtomicU64::new(0),
        })
    }

    /// Prefix store keys with `namespace` instead of `"sliding"`
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

    fn next_member(&self, score: i64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{score}-{:016x}-{seq}", self.nonce)
    }
}

pub(crate) fn validate(limit: u64, window_seconds: f64) -> Result<Duration, LimitError> {
    if limit == 0 {
        return Err(LimitError::invalid("limit must be positive"));
    }
    if !window_seconds.is_finite() || window_seconds <= 0.0 {
        return Err(LimitError::invalid(format!(
            "window must be a positive number of seconds, got {window_seconds}"
        )));
    }
    if window_seconds > MAX_WINDOW_SECS as f64 {
        return Err(LimitError::invalid(format!(
            "window must not exceed {MAX_WINDOW_SECS} seconds, got {window_seconds}"
        )));
    }

    let window = Duration::from_secs_f64(window_seconds);
    if window.as_micros() == 0 {
        return Err(LimitError::invalid(
            "window must be at least one microsecond",
        ));
    }
    Ok(window)
}

impl<S: CounterStore> Limiter for SlidingWindow<S> {
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError> {
        let now_us = unix_micros(now)?;
        let entry = WindowEntry {
            member: self.next_member(now_us),
            score: now_us,
            min_score: now_us.saturating_sub(self.window_us),
            limit: self.limit,
        };

        // Outlive the newest entry so an entry sitting exactly on the window
        // edge is never expired before it is pruned.
        let ttl = self.window + Duration::from_millis(1);
        let store_key = format!("{}:{}", self.namespace, key);
        let admission = self.store.admit_to_window(&store_key, entry, ttl, now)?;

        let remaining = self.limit.saturating_sub(admission.count);
        if admission.admitted {
            tracing::trace!(key, count = admission.count, "sliding window allowed");
            return Ok(Decision::allowed(self.limit, remaining));
        }

        // The oldest entry frees its slot one microsecond past the window edge
        let retry_after = admission
            .oldest_score
            .map(|oldest| {
                let free_at = oldest.saturating_add(self.window_us).saturating_add(1);
                Duration::from_micros(free_at.saturating_sub(now_us).max(0) as u64)
            })
            .unwrap_or(Duration::ZERO);

        tracing::debug!(
            key,
            count = admission.count,
            limit = self.limit,
            "sliding window exhausted"
        );
        Ok(Decision::denied(self.limit, remaining, retry_after))
    }
}
