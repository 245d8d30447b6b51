//! Refill rates for token buckets
//!
//! This module provides the [`Rate`] type which represents how many tokens a
//! bucket regains per second. It converts human-friendly rate specifications
//! (e.g., "100 requests per minute") into that single number.

use std::time::Duration;


/// Rate at which a token bucket refills
///
/// # Examples
///
/// ```
/// use tallycrab::Rate;
/// use std::time::Duration;
///
/// // 10 tokens per second
/// let rate = Rate::per_second(10);
/// assert_eq!(rate.interval(), Duration::from_millis(100));
///
/// // 60 tokens per minute (1 per second)
/// let rate = Rate::per_minute(60);
/// assert_eq!(rate.tokens_per_second(), 1.0);
///
/// // Custom rate: 1 token every 2.5 seconds
/// let rate = Rate::new(Duration::from_millis(2500));
/// assert_eq!(rate.tokens_per_second(), 0.4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    tokens_per_second: f64,
}

impl Rate {
    /// Creates a rate of one token every `interval`
    ///
    /// A zero interval yields an infinite rate, which limiters reject.
    pub fn new(interval: Duration) -> Self {
        Rate {
            tokens_per_second: 1.0 / interval.as_secs_f64(),
        }
    }

    /// Creates a rate of n tokens per second
    pub fn per_second(n: u64) -> Self {
        Self::from_count_and_period(n, 1.0)
    }

    /// Creates a rate of n tokens per minute
    pub fn per_minute(n: u64) -> Self {
        Self::from_count_and_period(n, 60.0)
    }

    /// Creates a rate of n tokens per hour
    pub fn per_hour(n: u64) -> Self {
        Self::from_count_and_period(n, 3600.0)
    }

    /// Creates a rate of n tokens per day
    pub fn per_day(n: u64) -> Self {
        Self::from_count_and_period(n, 86400.0)
    }

    /// Creates a rate from a token count and a period in seconds
    ///
    /// # Example
    ///
    /// ```
    /// use tallycrab::Rate;
    ///
    /// // 100 tokens per 60 seconds
    /// let rate = Rate::from_count_and_period(100, 60.0);
    /// assert!((rate.tokens_per_second() - 100.0 / 60.0).abs() < 1e-12);
    /// ```
    pub fn from_count_and_period(count: u64, period_seconds: f64) -> Self {
        Rate {
            tokens_per_second: count as f64 / period_seconds,
        }
    }

    /// Tokens regained per second
    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    /// Time needed to regain a single token
    ///
    /// Saturates at [`Duration::MAX`] for rates that are zero, negative or too
    /// slow to represent.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tokens_per_second).unwrap_or(Duration::MAX)
    }

    /// Time needed to regain `tokens` tokens
    pub fn time_to_refill(&self, tokens: f64) -> Duration {
        if tokens <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(tokens / self.tokens_per_second).unwrap_or(Duration::MAX)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.tokens_per_second.is_finite() && self.tokens_per_second > 0.0
    }
}

impl From<f64> for Rate {
    /// Interprets the value as tokens per second
    fn from(tokens_per_second: f64) -> Self {
        Rate { tokens_per_second }
    }
}
