//! # TallyCrab
//!
//! Fixed-window, sliding-window and token-bucket rate limiters over a shared
//! counter store.
//!
//! ## Overview
//!
//! Limiters in this crate keep no per-key state of their own. Everything
//! lives in a [`CounterStore`], which only has to offer a few atomic
//! primitives: increment-with-expiry, an ordered-set admission step and
//! compare-and-set for bucket state. That makes every limiter:
//! - **Shareable**: one instance can serve any number of threads
//! - **Distributable**: point it at a networked store and every process
//!   enforces the same limit
//! - **Testable**: time is an explicit argument of every `*_at` method
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tallycrab::{Limiter, MemoryStore, TokenBucket};
//!
//! let store = Arc::new(MemoryStore::new());
//!
//! // Bursts of 10, refilled at 2 tokens per second
//! let limiter = TokenBucket::new(store, 10.0, 2.0)?;
//!
//! let decision = limiter.check("user:123")?;
//! if decision.allowed {
//!     println!("Request allowed! Remaining: {}", decision.remaining);
//! } else {
//!     println!("Rate limited! Retry after: {:?}", decision.retry_after);
//! }
//! # Ok::<(), tallycrab::LimitError>(())
//! ```
//!
//! ## Strategies
//!
//! ### [`FixedWindow`]
//! One counter per key per window. Cheapest, but allows up to twice the
//! limit across a window boundary.
//!
//! ### [`SlidingWindow`]
//! A log of request timestamps per key; exact over any window-length span.
//! Denied requests are never recorded.
//!
//! ### [`TokenBucket`]
//! A refilling budget per key. Allows bursts up to the capacity and requests
//! of variable cost.
//!
//! ## Store failures
//!
//! Store errors are surfaced as [`LimitError::StoreUnavailable`] and never
//! retried. Pick a [`FailurePolicy`] to fail open or closed:
//!
//! ```
//! use tallycrab::{FailurePolicy, FixedWindow, Limiter, MemoryStore};
//!
//! let limiter = FixedWindow::new(MemoryStore::new(), 100, 60)?;
//! let allowed = FailurePolicy::Open.resolve(limiter.allow("search"))?;
//! assert!(allowed);
//! # Ok::<(), tallycrab::LimitError>(())
//! ```
//!
//! ## Thread Safety
//!
//! Limiters are `Send + Sync` and take `&self`; share them through an `Arc`
//! (or a plain reference). Stores are shared the same way: every
//! [`CounterStore`] is also implemented for `&S`, `Arc<S>` and `Box<S>`.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing in [`MemoryStore`]
//! - `serde` (default): Deserializable [`LimiterConfig`] and [`FailurePolicy`]
//! - `settings`: Load named limiter policies from files and environment
//!   variables with the `config` crate

pub mod core;

pub use core::{
    BucketSpend, BucketState, CounterStore, Decision, FailurePolicy, FixedWindow, LimitError,
    Limiter, MemoryStore, MemoryStoreBuilder, Rate, SlidingWindow, SpendOutcome, StoreError,
    TokenBucket, WindowAdmission, WindowEntry,
};

#[cfg(feature = "serde")]
pub use core::config::LimiterConfig;

#[cfg(feature = "settings")]
pub use core::config::Settings;

// Re-export the store module so other backends and benchmarks can reach it
pub use crate::core::store;
