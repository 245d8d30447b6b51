//! Token bucket with lazy refill
//!
//! A bucket holds up to `capacity` tokens and regains them continuously at
//! the configured [`Rate`]. Nothing runs in the background: every request
//! credits the tokens earned since the last refill and tries to spend its
//! cost in one [`CounterStore::spend_from_bucket`] call. Stores without a
//! native atomic spend fall back to a load / compare-and-set loop, where a
//! lost race restarts against the fresh state, so two callers can never both
//! spend the same token.

use super::store::{BucketSpend, CounterStore};
use super::{Decision, LimitError, Limiter, Rate, unix_nanos};
use std::time::{Duration, SystemTime};

const DEFAULT_NAMESPACE: &str = "bucket";

/// Token-bucket rate limiter
///
/// # Example
///
/// ```
/// use tallycrab::{Limiter, MemoryStore, TokenBucket};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// // Bursts of 5, refilled at 1 token per second
/// let bucket = TokenBucket::new(MemoryStore::new(), 5.0, 1.0)?;
/// let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
///
/// for _ in 0..5 {
///     assert!(bucket.allow_at("api_key", t0)?);
/// }
/// assert!(!bucket.allow_at("api_key", t0 + Duration::from_millis(500))?);
/// assert!(bucket.allow_at("api_key", t0 + Duration::from_secs(1))?);
///
/// // Heavier operations spend more than one token
/// assert!(!bucket.check_n_at("api_key", 3.0, t0 + Duration::from_secs(2))?.allowed);
/// # Ok::<(), tallycrab::LimitError>(())
/// ```
#[derive(Debug)]
pub struct TokenBucket<S> {
    store: S,
    capacity: f64,
    rate: Rate,
    namespace: String,
    idle_ttl: Option<Duration>,
}

impl<S: CounterStore> TokenBucket<S> {
    /// Create a bucket of `capacity` tokens refilled at `refill_rate`
    ///
    /// `refill_rate` is a [`Rate`] or a plain `f64` of tokens per second.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] if `capacity` or the refill rate is
    /// not a positive, finite number.
    pub fn new(store: S, capacity: f64, refill_rate: impl Into<Rate>) -> Result<Self, LimitError> {
        let rate = refill_rate.into();
        validate(capacity, rate)?;

        Ok(TokenBucket {
            store,
            capacity,
            rate,
            namespace: DEFAULT_NAMESPACE.to_string(),
            idle_ttl: None,
        })
    }

    /// Prefix store keys with `namespace` instead of `"bucket"`
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Let the store drop buckets untouched for `ttl`
    ///
    /// Buckets are kept forever by default. A TTL of at least
    /// `capacity / refill_rate` loses nothing, since an idle bucket is full by
    /// then and a missing bucket starts full.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] for a zero TTL, which would drop
    /// every bucket right after it is written.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Result<Self, LimitError> {
        validate_idle_ttl(ttl)?;
        self.idle_ttl = Some(ttl);
        Ok(self)
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether a request costing `cost` tokens is allowed now
    pub fn allow_n(&self, key: &str, cost: f64) -> Result<bool, LimitError> {
        Ok(self.check_n_at(key, cost, SystemTime::now())?.allowed)
    }

    /// Check and spend `cost` tokens for `key` at time `now`
    ///
    /// # Errors
    ///
    /// - [`LimitError::InvalidConfiguration`]: `cost` is negative, not finite or
    ///   larger than the capacity (such a request could never succeed)
    /// - [`LimitError::StoreUnavailable`]: the store failed, or a
    ///   compare-and-set store lost too many consecutive races
    pub fn check_n_at(&self, key: &str, cost: f64, now: SystemTime) -> Result<Decision, LimitError> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(LimitError::invalid(format!(
                "cost must be a non-negative number, got {cost}"
            )));
        }
        if cost > self.capacity {
            return Err(LimitError::invalid(format!(
                "cost {cost} exceeds bucket capacity {}",
                self.capacity
            )));
        }

        let spend = BucketSpend {
            capacity: self.capacity,
            tokens_per_second: self.rate.tokens_per_second(),
            cost,
            now_ns: unix_nanos(now)?,
            ttl: self.idle_ttl,
        };
        let store_key = format!("{}:{}", self.namespace, key);
        let outcome = self.store.spend_from_bucket(&store_key, spend, now)?;

        Ok(self.decide(key, outcome.allowed, cost, outcome.tokens))
    }

    fn decide(&self, key: &str, allowed: bool, cost: f64, tokens: f64) -> Decision {
        let limit = self.capacity.floor() as u64;
        let remaining = tokens.floor() as u64;

        if allowed {
            tracing::trace!(key, tokens, "token bucket allowed");
            Decision::allowed(limit, remaining)
        } else {
            tracing::debug!(key, tokens, cost, "token bucket empty");
            Decision::denied(limit, remaining, self.rate.time_to_refill(cost - tokens))
        }
    }
}

pub(crate) fn validate(capacity: f64, rate: Rate) -> Result<(), LimitError> {
    if !capacity.is_finite() || capacity <= 0.0 {
        return Err(LimitError::invalid(format!(
            "capacity must be a positive number, got {capacity}"
        )));
    }
    if !rate.is_valid() {
        return Err(LimitError::invalid(format!(
            "refill rate must be a positive number of tokens per second, got {}",
            rate.tokens_per_second()
        )));
    }
    Ok(())
}

pub(crate) fn validate_idle_ttl(ttl: Duration) -> Result<(), LimitError> {
    if ttl.is_zero() {
        return Err(LimitError::invalid("idle TTL must be positive"));
    }
    Ok(())
}

impl<S: CounterStore> Limiter for TokenBucket<S> {
    fn check_at(&self, key: &str, now: SystemTime) -> Result<Decision, LimitError> {
        self.check_n_at(key, 1.0, now)
    }
}
