//! Declarative limiter configuration
//!
//! A [`LimiterConfig`] describes one limiter as data, so limits can live in a
//! config file instead of code:
//!
//! ```
//! use tallycrab::{Limiter, LimiterConfig, MemoryStore};
//!
//! let config: LimiterConfig = serde_json::from_str(
//!     r#"{ "kind": "token_bucket", "capacity": 20, "refill_rate": 2.5 }"#,
//! ).unwrap();
//!
//! let limiter = config.build(MemoryStore::new())?;
//! assert!(limiter.allow("user:1")?);
//! # Ok::<(), tallycrab::LimitError>(())
//! ```
//!
//! With the `settings` feature, [`Settings`] loads a whole set of named
//! policies from a file layered with `TALLYCRAB_` environment variables.

use super::store::CounterStore;
use super::{FixedWindow, LimitError, Limiter, Rate, SlidingWindow, TokenBucket};
use super::{fixed_window, sliding_window, token_bucket};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One limiter, described declaratively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// See [`FixedWindow`]
    FixedWindow {
        limit: u64,
        window_seconds: u64,
        namespace: Option<String>,
    },
    /// See [`SlidingWindow`]
    SlidingWindow {
        limit: u64,
        window_seconds: f64,
        namespace: Option<String>,
    },
    /// See [`TokenBucket`]
    TokenBucket {
        capacity: f64,
        /// Tokens per second
        refill_rate: f64,
        namespace: Option<String>,
        idle_ttl_seconds: Option<u64>,
    },
}

impl LimiterConfig {
    /// Check the parameters without building anything
    pub fn validate(&self) -> Result<(), LimitError> {
        match self {
            LimiterConfig::FixedWindow {
                limit,
                window_seconds,
                ..
            } => fixed_window::validate(*limit, *window_seconds),
            LimiterConfig::SlidingWindow {
                limit,
                window_seconds,
                ..
            } => sliding_window::validate(*limit, *window_seconds).map(|_| ()),
            LimiterConfig::TokenBucket {
                capacity,
                refill_rate,
                idle_ttl_seconds,
                ..
            } => {
                token_bucket::validate(*capacity, Rate::from(*refill_rate))?;
                match idle_ttl_seconds {
                    Some(secs) => token_bucket::validate_idle_ttl(Duration::from_secs(*secs)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Build the described limiter on top of `store`
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] if any parameter is out of range.
    pub fn build<S>(&self, store: S) -> Result<Box<dyn Limiter>, LimitError>
    where
        S: CounterStore + 'static,
    {
        let limiter: Box<dyn Limiter> = match self {
            LimiterConfig::FixedWindow {
                limit,
                window_seconds,
                namespace,
            } => {
                let limiter = FixedWindow::new(store, *limit, *window_seconds)?;
                match namespace {
                    Some(ns) => Box::new(limiter.with_namespace(ns.clone())),
                    None => Box::new(limiter),
                }
            }
            LimiterConfig::SlidingWindow {
                limit,
                window_seconds,
                namespace,
            } => {
                let limiter = SlidingWindow::new(store, *limit, *window_seconds)?;
                match namespace {
                    Some(ns) => Box::new(limiter.with_namespace(ns.clone())),
                    None => Box::new(limiter),
                }
            }
            LimiterConfig::TokenBucket {
                capacity,
                refill_rate,
                namespace,
                idle_ttl_seconds,
            } => {
                let mut limiter = TokenBucket::new(store, *capacity, *refill_rate)?;
                if let Some(ns) = namespace {
                    limiter = limiter.with_namespace(ns.clone());
                }
                if let Some(secs) = idle_ttl_seconds {
                    limiter = limiter.with_idle_ttl(Duration::from_secs(*secs))?;
                }
                Box::new(limiter)
            }
        };
        Ok(limiter)
    }
}

#[cfg(feature = "settings")]
pub use self::settings::Settings;

#[cfg(feature = "settings")]
mod settings {
    use super::LimiterConfig;
    use crate::core::store::CounterStore;
    use crate::core::{FailurePolicy, LimitError, Limiter};
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::path::Path;

    const ENV_PREFIX: &str = "TALLYCRAB";

    /// Named limiter policies plus the failure policy applied to them
    ///
    /// # Example
    ///
    /// ```toml
    /// failure_policy = "open"
    ///
    /// [limiters.login]
    /// kind = "fixed_window"
    /// limit = 5
    /// window_seconds = 60
    ///
    /// [limiters.api]
    /// kind = "token_bucket"
    /// capacity = 100
    /// refill_rate = 10
    /// ```
    ///
    /// Environment variables override the file, e.g.
    /// `TALLYCRAB_LIMITERS__LOGIN__LIMIT=10` or `TALLYCRAB_FAILURE_POLICY=closed`.
    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    pub struct Settings {
        #[serde(default)]
        pub failure_policy: FailurePolicy,
        #[serde(default)]
        pub limiters: BTreeMap<String, LimiterConfig>,
    }

    impl Settings {
        /// Load settings from `path` (if given) layered with environment variables
        ///
        /// The file format follows the extension (TOML, YAML, JSON, ...).
        pub fn load(path: Option<&Path>) -> Result<Self, LimitError> {
            let mut builder = ::config::Config::builder();
            if let Some(path) = path {
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            let config = builder
                .add_source(
                    ::config::Environment::with_prefix(ENV_PREFIX)
                        .prefix_separator("_")
                        .separator("__")
                        .try_parsing(true),
                )
                .build();
            Self::from_config(config)
        }

        /// Load settings from a single configuration source
        pub fn from_source<T>(source: T) -> Result<Self, LimitError>
        where
            T: ::config::Source + Send + Sync + 'static,
        {
            Self::from_config(::config::Config::builder().add_source(source).build())
        }

        fn from_config(
            config: Result<::config::Config, ::config::ConfigError>,
        ) -> Result<Self, LimitError> {
            let settings: Settings = config
                .and_then(|config| config.try_deserialize())
                .map_err(|e| LimitError::invalid(format!("failed to load settings: {e}")))?;

            for (name, limiter) in &settings.limiters {
                limiter
                    .validate()
                    .map_err(|e| LimitError::invalid(format!("limiter {name:?}: {e}")))?;
            }
            tracing::debug!(limiters = settings.limiters.len(), "loaded limiter settings");
            Ok(settings)
        }

        /// Build every named limiter against clones of `store`
        pub fn build_all<S>(&self, store: S) -> Result<BTreeMap<String, Box<dyn Limiter>>, LimitError>
        where
            S: CounterStore + Clone + 'static,
        {
            self.limiters
                .iter()
                .map(|(name, config)| Ok((name.clone(), config.build(store.clone())?)))
                .collect()
        }
    }
}
