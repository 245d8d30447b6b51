use super::{
    BucketSpend, BucketState, CounterStore, OrderedSet, SpendOutcome, StoreError,
    WindowAdmission, WindowEntry,
};
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::{AHashMap as HashMap, RandomState};
#[cfg(not(feature = "ahash"))]
use std::collections::{HashMap, hash_map::RandomState};
#[cfg(not(feature = "ahash"))]
use std::hash::BuildHasher;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_SHARDS: usize = 16;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Sharded in-process [`CounterStore`]
///
/// Keys are spread over a fixed number of shards, each guarded by its own
/// mutex. A key always lands in the same shard, so every store operation runs
/// under exactly one lock and is atomic for that key while unrelated keys in
/// other shards proceed in parallel.
///
/// Expired entries behave as absent immediately. They are physically removed
/// at regular intervals: the first operation on a shard after its cleanup
/// deadline sweeps that shard.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tallycrab::{FixedWindow, Limiter, MemoryStore};
///
/// let store = Arc::new(
///     MemoryStore::builder()
///         .capacity(100_000)
///         .shards(32)
///         .cleanup_interval(Duration::from_secs(300))
///         .build(),
/// );
/// let limiter = FixedWindow::new(store, 100, 60).unwrap();
/// assert!(limiter.allow("user:1").unwrap());
/// ```
pub struct MemoryStore {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
    cleanup_interval: Duration,
}

/// Builder for configuring a [`MemoryStore`]
///
/// # Example
///
/// ```
/// use tallycrab::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::builder()
///     .capacity(50_000)
///     .cleanup_interval(Duration::from_secs(120))
///     .build();
/// ```
pub struct MemoryStoreBuilder {
    capacity: usize,
    shards: usize,
    cleanup_interval: Duration,
}

struct Shard {
    data: HashMap<String, Entry>,
    // Unset until the first operation so cleanup follows the caller's clock
    next_cleanup: Option<SystemTime>,
    expired_count: usize,
}

struct Entry {
    value: Value,
    expires_at: Option<SystemTime>,
}

enum Value {
    Counter(u64),
    Window(OrderedSet),
    Bucket(BucketState),
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

fn expiry_after(now: SystemTime, ttl: Duration) -> Option<SystemTime> {
    // An unrepresentable deadline means the entry never expires
    now.checked_add(ttl)
}

impl Shard {
    fn with_capacity(capacity: usize) -> Self {
        Shard {
            data: HashMap::with_capacity(capacity),
            next_cleanup: None,
            expired_count: 0,
        }
    }

    fn maybe_clean_expired(&mut self, now: SystemTime, interval: Duration) {
        match self.next_cleanup {
            None => self.next_cleanup = expiry_after(now, interval),
            Some(deadline) if now >= deadline => {
                let before_count = self.data.len();
                self.data.retain(|_, entry| !entry.is_expired(now));
                self.expired_count = before_count.saturating_sub(self.data.len());
                self.next_cleanup = expiry_after(now, interval);
            }
            Some(_) => {}
        }
    }

    fn purge_if_expired(&mut self, key: &str, now: SystemTime) {
        if self.data.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.data.remove(key);
        }
    }
}

impl MemoryStore {
    /// Create a new MemoryStore with default configuration
    ///
    /// Uses a capacity of 1000 keys, 16 shards and a 60 second cleanup interval.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new MemoryStore sized for `capacity` keys
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Create a new builder for configuring a MemoryStore
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    fn with_config(capacity: usize, shards: usize, cleanup_interval: Duration) -> Self {
        let shards = shards.max(1).next_power_of_two();
        let per_shard = (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize / shards;

        MemoryStore {
            shards: (0..shards)
                .map(|_| Mutex::new(Shard::with_capacity(per_shard)))
                .collect(),
            hasher: RandomState::new(),
            cleanup_interval,
        }
    }

    /// Number of shards (always a power of two)
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().data.len()).sum()
    }

    #[cfg(test)]
    pub fn expired_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().expired_count).sum()
    }

    fn with_shard<R>(&self, key: &str, now: SystemTime, f: impl FnOnce(&mut Shard) -> R) -> R {
        let index = self.hasher.hash_one(key) as usize & (self.shards.len() - 1);
        let mut shard = self.shards[index].lock();
        shard.maybe_clean_expired(now, self.cleanup_interval);
        shard.purge_if_expired(key, now);
        f(&mut shard)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for MemoryStore {
    fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<u64, StoreError> {
        self.with_shard(key, now, |shard| match shard.data.get_mut(key) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => {
                *count = count.saturating_add(1);
                Ok(*count)
            }
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => {
                shard.data.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: expiry_after(now, ttl),
                    },
                );
                Ok(1)
            }
        })
    }

    fn admit_to_window(
        &self,
        key: &str,
        entry: WindowEntry,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<WindowAdmission, StoreError> {
        self.with_shard(key, now, |shard| {
            let slot = shard.data.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Window(OrderedSet::new()),
                expires_at: None,
            });
            let Value::Window(set) = &mut slot.value else {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                });
            };

            set.remove_range_by_score(i64::MIN, entry.min_score.saturating_sub(1));
            set.add(&entry.member, entry.score);

            let admitted = set.count() <= entry.limit;
            if !admitted {
                set.remove(&entry.member);
            }

            let admission = WindowAdmission {
                count: set.count(),
                admitted,
                oldest_score: set.oldest_score(),
            };

            // An emptied set disappears, as a sorted set does in Redis
            if set.is_empty() {
                shard.data.remove(key);
            } else {
                slot.expires_at = expiry_after(now, ttl);
            }

            Ok(admission)
        })
    }

    fn load_bucket(&self, key: &str, now: SystemTime) -> Result<Option<BucketState>, StoreError> {
        self.with_shard(key, now, |shard| match shard.data.get(key) {
            Some(Entry {
                value: Value::Bucket(state),
                ..
            }) => Ok(Some(*state)),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        })
    }

    fn compare_and_set_bucket(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
        ttl: Option<Duration>,
        now: SystemTime,
    ) -> Result<bool, StoreError> {
        self.with_shard(key, now, |shard| {
            let current = match shard.data.get(key) {
                Some(Entry {
                    value: Value::Bucket(state),
                    ..
                }) => Some(*state),
                Some(_) => {
                    return Err(StoreError::WrongType {
                        key: key.to_string(),
                    });
                }
                None => None,
            };

            if current != expected {
                return Ok(false);
            }

            shard.data.insert(
                key.to_string(),
                Entry {
                    value: Value::Bucket(new),
                    expires_at: ttl.and_then(|ttl| expiry_after(now, ttl)),
                },
            );
            Ok(true)
        })
    }

    // One shard lock covers load and write, so no retry loop is needed
    fn spend_from_bucket(
        &self,
        key: &str,
        spend: BucketSpend,
        now: SystemTime,
    ) -> Result<SpendOutcome, StoreError> {
        self.with_shard(key, now, |shard| {
            let current = match shard.data.get(key) {
                Some(Entry {
                    value: Value::Bucket(state),
                    ..
                }) => Some(*state),
                Some(_) => {
                    return Err(StoreError::WrongType {
                        key: key.to_string(),
                    });
                }
                None => None,
            };

            let (outcome, next) = spend.apply(current);
            shard.data.insert(
                key.to_string(),
                Entry {
                    value: Value::Bucket(next),
                    expires_at: spend.ttl.and_then(|ttl| expiry_after(now, ttl)),
                },
            );
            Ok(outcome)
        })
    }
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shards: DEFAULT_SHARDS,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl MemoryStoreBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected capacity (number of unique keys)
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the number of shards
    ///
    /// Rounded up to the next power of two. More shards mean less lock
    /// contention between unrelated keys.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the interval between cleanup sweeps of each shard
    ///
    /// Shorter intervals mean more consistent memory usage but higher CPU overhead.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Build the MemoryStore with the configured settings
    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.shards, self.cleanup_interval)
    }
}
