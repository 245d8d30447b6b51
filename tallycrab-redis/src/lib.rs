//! # TallyCrab Redis
//!
//! A Redis-backed [`CounterStore`](tallycrab::CounterStore) for the
//! [`tallycrab`] rate limiters. Point every process at the same server and
//! they all enforce one limit per key.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tallycrab::{FixedWindow, Limiter, TokenBucket};
//! use tallycrab_redis::{RedisConfig, RedisStore};
//!
//! let config = RedisConfig::new("redis://127.0.0.1:6379").with_prefix("api");
//! let store = Arc::new(RedisStore::open(&config)?);
//!
//! let per_minute = FixedWindow::new(store.clone(), 600, 60)?;
//! let burst = TokenBucket::new(store, 20.0, 10.0)?;
//!
//! let allowed = per_minute.allow("user:42")? && burst.allow("user:42")?;
//! # let _ = allowed;
//! # Ok::<(), tallycrab::LimitError>(())
//! ```
//!
//! Store failures surface as
//! [`LimitError::StoreUnavailable`](tallycrab::LimitError::StoreUnavailable);
//! wrap calls in a [`FailurePolicy`](tallycrab::FailurePolicy) to fail open or
//! closed during an outage.

mod config;
mod pool;
mod scripts;
mod store;

pub use crate::config::RedisConfig;
pub use crate::store::RedisStore;
