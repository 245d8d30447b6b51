use serde::Deserialize;
use std::time::Duration;

const DEFAULT_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_PREFIX: &str = "tallycrab";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 16;
const ENV_PREFIX: &str = "TALLYCRAB_REDIS";

/// Redis connection settings
///
/// Environment variables (see [`RedisConfig::from_env`]):
/// - `TALLYCRAB_REDIS_URL`: connection URL (default `redis://127.0.0.1:6379`)
/// - `TALLYCRAB_REDIS_PREFIX`: prefix for every key (default `tallycrab`)
/// - `TALLYCRAB_REDIS_CONNECT_TIMEOUT_SECS`: connect and command timeout
///   (default 5, must be positive)
/// - `TALLYCRAB_REDIS_MAX_IDLE_CONNECTIONS`: connections kept open between
///   calls (default 16, must be positive)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
    pub connect_timeout_secs: u64,
    pub max_idle_connections: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Read the settings from `TALLYCRAB_REDIS_*` environment variables
    pub fn from_env() -> Result<Self, ::config::ConfigError> {
        Self::from_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Read the settings from any `config` source, filling gaps with defaults
    pub fn from_source<T>(source: T) -> Result<Self, ::config::ConfigError>
    where
        T: ::config::Source + Send + Sync + 'static,
    {
        let config: Self = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that would leave the store unable to do any work
    ///
    /// A zero timeout makes every connection attempt fail at once.
    pub fn validate(&self) -> Result<(), ::config::ConfigError> {
        if self.url.trim().is_empty() {
            return Err(::config::ConfigError::Message(
                "url cannot be empty".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(::config::ConfigError::Message(
                "connect_timeout_secs must be positive".into(),
            ));
        }
        if self.max_idle_connections == 0 {
            return Err(::config::ConfigError::Message(
                "max_idle_connections must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
