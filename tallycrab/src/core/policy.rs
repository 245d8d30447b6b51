//! What to do when the store is down
//!
//! Limiters always report store failures. Callers that would rather keep
//! serving (or keep refusing) than handle the error themselves resolve the
//! outcome through a [`FailurePolicy`].

use super::LimitError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fail-open or fail-closed handling of [`LimitError::StoreUnavailable`]
///
/// Configuration errors are never absorbed: a limiter that cannot be
/// satisfied is a bug, not an outage.
///
/// # Example
///
/// ```
/// use tallycrab::{FailurePolicy, LimitError, StoreError};
///
/// let outage: Result<bool, LimitError> =
///     Err(StoreError::Unavailable("connection refused".into()).into());
///
/// assert_eq!(FailurePolicy::Open.resolve(outage.clone()), Ok(true));
/// assert_eq!(FailurePolicy::Closed.resolve(outage), Ok(false));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FailurePolicy {
    /// Let requests through while the store is unavailable
    Open,
    /// Refuse requests while the store is unavailable
    #[default]
    Closed,
}

impl FailurePolicy {
    /// Turn a store failure into an allow (open) or deny (closed) decision
    pub fn resolve(self, outcome: Result<bool, LimitError>) -> Result<bool, LimitError> {
        match outcome {
            Err(LimitError::StoreUnavailable(error)) => {
                let allowed = self == FailurePolicy::Open;
                tracing::warn!(%error, allowed, "rate limit store unavailable, applying failure policy");
                Ok(allowed)
            }
            other => other,
        }
    }
}
