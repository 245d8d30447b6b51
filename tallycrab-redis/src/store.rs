use crate::config::RedisConfig;
use crate::pool::Pool;
use crate::scripts::Scripts;
use redis::{Client, Connection, RedisError, RedisResult};
use std::time::{Duration, SystemTime};
use tallycrab::LimitError;
use tallycrab::store::{
    BucketSpend, BucketState, CounterStore, SpendOutcome, StoreError, WindowAdmission, WindowEntry,
};

// Keeps now + ttl inside Redis' signed millisecond range
const MAX_TTL_MS: u64 = i64::MAX as u64 / 1000;

/// [`CounterStore`] backed by a Redis server
///
/// Every operation is a single command or Lua script, so limiters running in
/// different processes against the same server enforce one shared limit.
///
/// Connections come from a small pool: each call takes an idle connection or
/// opens a new one, and hands it back afterwards. Up to
/// [`RedisConfig::max_idle_connections`] stay open between calls. A
/// connection that fails with an I/O error is closed instead of returned, and
/// the failing call reports [`StoreError::Unavailable`].
///
/// Expiry is tracked by the server's clock. The `now` passed to each
/// operation is ignored here.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tallycrab::{Limiter, SlidingWindow};
/// use tallycrab_redis::{RedisConfig, RedisStore};
///
/// let config = RedisConfig::from_env().unwrap();
/// let store = Arc::new(RedisStore::open(&config)?);
/// let limiter = SlidingWindow::new(store, 100, 60.0)?;
///
/// if !limiter.allow("ip:10.0.0.1")? {
///     println!("slow down");
/// }
/// # Ok::<(), tallycrab::LimitError>(())
/// ```
pub struct RedisStore {
    client: Client,
    pool: Pool<Connection>,
    prefix: String,
    timeout: Duration,
    scripts: Scripts,
}

impl RedisStore {
    /// Create a store for `config`
    ///
    /// The settings and URL are checked here; connections are made on first
    /// use.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidConfiguration`] if `config` fails
    /// [`RedisConfig::validate`] or the URL cannot be parsed.
    pub fn open(config: &RedisConfig) -> Result<Self, LimitError> {
        config
            .validate()
            .map_err(|e| LimitError::InvalidConfiguration(e.to_string()))?;
        let client = Client::open(config.url.as_str())
            .map_err(|e| LimitError::InvalidConfiguration(format!("invalid Redis URL: {e}")))?;

        Ok(RedisStore {
            client,
            pool: Pool::new(config.max_idle_connections),
            prefix: config.prefix.clone(),
            timeout: config.connect_timeout(),
            scripts: Scripts::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Connections currently open and waiting for the next call
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        tracing::debug!(prefix = %self.prefix, "connecting to Redis");
        let connect = || -> RedisResult<Connection> {
            let conn = self.client.get_connection_with_timeout(self.timeout)?;
            conn.set_read_timeout(Some(self.timeout))?;
            conn.set_write_timeout(Some(self.timeout))?;
            Ok(conn)
        };
        connect().map_err(|error| {
            tracing::warn!(%error, "failed to connect to Redis");
            StoreError::Unavailable(error.to_string())
        })
    }

    fn run<T>(
        &self,
        key: &str,
        op: impl FnOnce(&mut Connection) -> RedisResult<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self.pool.checkout(|| self.connect())?;

        match op(&mut conn) {
            Ok(value) => {
                self.pool.checkin(conn);
                Ok(value)
            }
            Err(error) => {
                if is_connection_error(&error) {
                    tracing::warn!(%error, "dropping broken Redis connection");
                } else {
                    self.pool.checkin(conn);
                }
                Err(map_error(key, error))
            }
        }
    }
}

impl CounterStore for RedisStore {
    fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        _now: SystemTime,
    ) -> Result<u64, StoreError> {
        let key = self.key(key);
        self.run(&key, |conn| {
            self.scripts
                .increment_and_expire
                .key(&key)
                .arg(ttl_millis(ttl))
                .invoke(conn)
        })
    }

    fn admit_to_window(
        &self,
        key: &str,
        entry: WindowEntry,
        ttl: Duration,
        _now: SystemTime,
    ) -> Result<WindowAdmission, StoreError> {
        let key = self.key(key);
        let (count, admitted, oldest): (u64, u8, Option<String>) = self.run(&key, |conn| {
            self.scripts
                .admit_to_window
                .key(&key)
                .arg(&entry.member)
                .arg(entry.score)
                .arg(entry.min_score)
                .arg(entry.limit)
                .arg(ttl_millis(ttl))
                .invoke(conn)
        })?;

        let oldest_score = oldest.map(|raw| parse_score(&key, &raw)).transpose()?;
        Ok(WindowAdmission {
            count,
            admitted: admitted == 1,
            oldest_score,
        })
    }

    fn load_bucket(&self, key: &str, _now: SystemTime) -> Result<Option<BucketState>, StoreError> {
        let key = self.key(key);
        let raw: Option<String> = self.run(&key, |conn| redis::cmd("GET").arg(&key).query(conn))?;
        raw.map(|raw| decode_bucket(&key, &raw)).transpose()
    }

    fn compare_and_set_bucket(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
        ttl: Option<Duration>,
        _now: SystemTime,
    ) -> Result<bool, StoreError> {
        let key = self.key(key);
        let expected = expected.map(encode_bucket).unwrap_or_default();
        let replaced: u8 = self.run(&key, |conn| {
            self.scripts
                .compare_and_set_bucket
                .key(&key)
                .arg(&expected)
                .arg(encode_bucket(new))
                .arg(ttl.map(ttl_millis).unwrap_or(0))
                .invoke(conn)
        })?;
        Ok(replaced == 1)
    }

    // One script refills and spends, so a check is a single round trip
    fn spend_from_bucket(
        &self,
        key: &str,
        spend: BucketSpend,
        _now: SystemTime,
    ) -> Result<SpendOutcome, StoreError> {
        let key = self.key(key);
        let (allowed, tokens): (u8, String) = self.run(&key, |conn| {
            self.scripts
                .spend_from_bucket
                .key(&key)
                .arg(spend.capacity)
                .arg(spend.tokens_per_second)
                .arg(spend.cost)
                .arg(spend.now_ns)
                .arg(spend.ttl.map(ttl_millis).unwrap_or(0))
                .invoke(conn)
        })?;

        let tokens = tokens.parse::<f64>().map_err(|_| StoreError::Corrupt {
            key: key.clone(),
            reason: format!("bad token count {tokens:?} from spend script"),
        })?;
        Ok(SpendOutcome {
            allowed: allowed == 1,
            tokens,
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis().min(MAX_TTL_MS as u128) as u64).max(1)
}

fn is_connection_error(error: &RedisError) -> bool {
    error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
}

fn map_error(key: &str, error: RedisError) -> StoreError {
    // Errors raised inside scripts may carry the code in the message only
    if error.code() == Some("WRONGTYPE") || error.to_string().contains("WRONGTYPE") {
        return StoreError::WrongType {
            key: key.to_string(),
        };
    }
    if error.code() == Some("CORRUPT") || error.to_string().contains("CORRUPT") {
        return StoreError::Corrupt {
            key: key.to_string(),
            reason: error.to_string(),
        };
    }
    StoreError::Unavailable(error.to_string())
}

/// Buckets are stored as `"{tokens}:{last_refill_ns}"`
///
/// `f64`'s `Display` round-trips exactly, so re-encoding a loaded state
/// reproduces the stored string for the compare-and-set.
fn encode_bucket(state: BucketState) -> String {
    format!("{}:{}", state.tokens, state.last_refill_ns)
}

fn decode_bucket(key: &str, raw: &str) -> Result<BucketState, StoreError> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("{reason} in {raw:?}"),
    };

    let (tokens, last_refill_ns) = raw
        .split_once(':')
        .ok_or_else(|| corrupt("missing separator"))?;
    let tokens: f64 = tokens.parse().map_err(|_| corrupt("bad token count"))?;
    let last_refill_ns: i64 = last_refill_ns
        .parse()
        .map_err(|_| corrupt("bad refill time"))?;

    if !tokens.is_finite() || tokens < 0.0 {
        return Err(corrupt("negative or non-finite token count"));
    }
    Ok(BucketState {
        tokens,
        last_refill_ns,
    })
}

fn parse_score(key: &str, raw: &str) -> Result<i64, StoreError> {
    raw.parse::<f64>()
        .map(|score| score as i64)
        .map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("bad score {raw:?}"),
        })
}
