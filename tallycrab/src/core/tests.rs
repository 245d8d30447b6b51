use super::store::{BucketState, CounterStore, StoreError, WindowAdmission, WindowEntry};
use super::{
    FailurePolicy, FixedWindow, LimitError, Limiter, MemoryStore, SlidingWindow, TokenBucket,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Aligned to both 10 and 60 second windows
const BASE_SECS: u64 = 1_700_000_040;

fn at(secs: f64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(BASE_SECS) + Duration::from_secs_f64(secs)
}

/// Store whose backend is permanently down
struct FailingStore;

impl CounterStore for FailingStore {
    fn increment_and_expire(&self, _: &str, _: Duration, _: SystemTime) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn admit_to_window(
        &self,
        _: &str,
        _: WindowEntry,
        _: Duration,
        _: SystemTime,
    ) -> Result<WindowAdmission, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn load_bucket(&self, _: &str, _: SystemTime) -> Result<Option<BucketState>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn compare_and_set_bucket(
        &self,
        _: &str,
        _: Option<BucketState>,
        _: BucketState,
        _: Option<Duration>,
        _: SystemTime,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Store that only offers the required primitives, so token buckets go
/// through the default load / compare-and-set loop
struct CasOnlyStore(MemoryStore);

impl CounterStore for CasOnlyStore {
    fn increment_and_expire(&self, key: &str, ttl: Duration, now: SystemTime) -> Result<u64, StoreError> {
        self.0.increment_and_expire(key, ttl, now)
    }

    fn admit_to_window(
        &self,
        key: &str,
        entry: WindowEntry,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<WindowAdmission, StoreError> {
        self.0.admit_to_window(key, entry, ttl, now)
    }

    fn load_bucket(&self, key: &str, now: SystemTime) -> Result<Option<BucketState>, StoreError> {
        self.0.load_bucket(key, now)
    }

    fn compare_and_set_bucket(
        &self,
        key: &str,
        expected: Option<BucketState>,
        new: BucketState,
        ttl: Option<Duration>,
        now: SystemTime,
    ) -> Result<bool, StoreError> {
        self.0.compare_and_set_bucket(key, expected, new, ttl, now)
    }
}

/// Store that loses every compare-and-set
struct RacingStore(MemoryStore);

impl CounterStore for RacingStore {
    fn increment_and_expire(&self, key: &str, ttl: Duration, now: SystemTime) -> Result<u64, StoreError> {
        self.0.increment_and_expire(key, ttl, now)
    }

    fn admit_to_window(
        &self,
        key: &str,
        entry: WindowEntry,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<WindowAdmission, StoreError> {
        self.0.admit_to_window(key, entry, ttl, now)
    }

    fn load_bucket(&self, key: &str, now: SystemTime) -> Result<Option<BucketState>, StoreError> {
        self.0.load_bucket(key, now)
    }

    fn compare_and_set_bucket(
        &self,
        _: &str,
        _: Option<BucketState>,
        _: BucketState,
        _: Option<Duration>,
        _: SystemTime,
    ) -> Result<bool, StoreError> {
        Ok(false)
    }
}

// Fixed window

#[test]
fn test_fixed_window_scenario() {
    let limiter = FixedWindow::new(MemoryStore::new(), 3, 60).unwrap();

    assert!(limiter.allow_at("user", at(0.0)).unwrap());
    assert!(limiter.allow_at("user", at(1.0)).unwrap());
    assert!(limiter.allow_at("user", at(2.0)).unwrap());
    assert!(!limiter.allow_at("user", at(3.0)).unwrap());
    assert!(limiter.allow_at("user", at(61.0)).unwrap());
}

#[test]
fn test_fixed_window_allows_exactly_limit() {
    for limit in [1, 2, 5, 17] {
        let limiter = FixedWindow::new(MemoryStore::new(), limit, 60).unwrap();
        let key = format!("key_{limit}");

        for i in 0..limit {
            assert!(
                limiter.allow_at(&key, at(5.0)).unwrap(),
                "Request {} of {} should be allowed",
                i + 1,
                limit
            );
        }
        assert!(
            !limiter.allow_at(&key, at(5.0)).unwrap(),
            "Request {} should be denied",
            limit + 1
        );
    }
}

#[test]
fn test_fixed_window_boundary_burst() {
    // Known trade-off: a full burst on either side of a boundary
    let limiter = FixedWindow::new(MemoryStore::new(), 5, 60).unwrap();

    for _ in 0..5 {
        assert!(limiter.allow_at("burst", at(59.9)).unwrap());
    }
    assert!(!limiter.allow_at("burst", at(59.9)).unwrap());

    for _ in 0..5 {
        assert!(limiter.allow_at("burst", at(60.0)).unwrap());
    }
    assert!(!limiter.allow_at("burst", at(60.1)).unwrap());
}

#[test]
fn test_fixed_window_decision() {
    let limiter = FixedWindow::new(MemoryStore::new(), 2, 60).unwrap();

    let first = limiter.check_at("decision", at(10.0)).unwrap();
    assert!(first.allowed);
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, 1);
    assert_eq!(first.retry_after, Duration::ZERO);

    let second = limiter.check_at("decision", at(10.0)).unwrap();
    assert!(second.allowed);
    assert_eq!(second.remaining, 0);

    let denied = limiter.check_at("decision", at(15.0)).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after, Duration::from_secs(45));
}

#[test]
fn test_fixed_window_different_keys() {
    let limiter = FixedWindow::new(MemoryStore::new(), 1, 60).unwrap();

    assert!(limiter.allow_at("key1", at(0.0)).unwrap());
    assert!(limiter.allow_at("key2", at(0.0)).unwrap());
    assert!(!limiter.allow_at("key1", at(0.0)).unwrap());
    assert!(!limiter.allow_at("key2", at(0.0)).unwrap());
}

#[test]
fn test_fixed_window_namespaces_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let login = FixedWindow::new(store.clone(), 1, 60)
        .unwrap()
        .with_namespace("login");
    let signup = FixedWindow::new(store, 1, 60)
        .unwrap()
        .with_namespace("signup");

    assert!(login.allow_at("ip:1", at(0.0)).unwrap());
    assert!(signup.allow_at("ip:1", at(0.0)).unwrap());
    assert!(!login.allow_at("ip:1", at(0.0)).unwrap());
}

#[test]
fn test_fixed_window_invalid_parameters() {
    assert!(matches!(
        FixedWindow::new(MemoryStore::new(), 0, 60),
        Err(LimitError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        FixedWindow::new(MemoryStore::new(), 10, 0),
        Err(LimitError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        FixedWindow::new(MemoryStore::new(), 10, u64::MAX),
        Err(LimitError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_time_before_epoch_is_rejected() {
    let limiter = FixedWindow::new(MemoryStore::new(), 10, 60).unwrap();
    let before_epoch = UNIX_EPOCH - Duration::from_secs(1);

    assert!(matches!(
        limiter.allow_at("key", before_epoch),
        Err(LimitError::InvalidConfiguration(_))
    ));
}

// Sliding window

#[test]
fn test_sliding_window_scenario() {
    let limiter = SlidingWindow::new(MemoryStore::new(), 2, 10.0).unwrap();

    assert!(limiter.allow_at("user", at(0.0)).unwrap());
    assert!(limiter.allow_at("user", at(5.0)).unwrap());
    assert!(!limiter.allow_at("user", at(8.0)).unwrap());
    assert!(limiter.allow_at("user", at(11.0)).unwrap());
}

#[test]
fn test_sliding_window_expires_old_requests() {
    let limit = 4;
    let window = 10.0;
    let limiter = SlidingWindow::new(MemoryStore::new(), limit, window).unwrap();

    for _ in 0..limit {
        assert!(limiter.allow_at("expiry", at(0.0)).unwrap());
    }

    // Still inside the window
    assert!(!limiter.allow_at("expiry", at(window / 2.0)).unwrap());
    assert!(!limiter.allow_at("expiry", at(window)).unwrap());

    // Just past the window every old request is gone
    assert!(limiter.allow_at("expiry", at(window + 0.001)).unwrap());
}

#[test]
fn test_sliding_window_denied_requests_are_not_recorded() {
    let store = Arc::new(MemoryStore::new());
    let limiter = SlidingWindow::new(store.clone(), 3, 60.0).unwrap();

    let mut allowed = 0;
    for _ in 0..8 {
        if limiter.allow_at("rapid", at(1.0)).unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 3);

    // Count the stored set without a limit: 3 recorded + this entry
    let unlimited = WindowEntry {
        member: "count".to_string(),
        score: 1_000,
        min_score: 0,
        limit: u64::MAX,
    };
    let admission = store
        .admit_to_window("sliding:rapid", unlimited, Duration::from_secs(60), at(1.0))
        .unwrap();
    assert_eq!(admission.count, 4);
}

#[test]
fn test_sliding_window_identical_timestamps() {
    let limiter = SlidingWindow::new(MemoryStore::new(), 5, 1.0).unwrap();

    for i in 0..5 {
        assert!(
            limiter.allow_at("same_instant", at(3.0)).unwrap(),
            "Request {} should be allowed",
            i + 1
        );
    }
    assert!(!limiter.allow_at("same_instant", at(3.0)).unwrap());
}

#[test]
fn test_sliding_window_fractional_window() {
    let limiter = SlidingWindow::new(MemoryStore::new(), 2, 0.5).unwrap();

    assert!(limiter.allow_at("fast", at(0.0)).unwrap());
    assert!(limiter.allow_at("fast", at(0.1)).unwrap());
    assert!(!limiter.allow_at("fast", at(0.2)).unwrap());
    assert!(limiter.allow_at("fast", at(0.55)).unwrap());
}

#[test]
fn test_sliding_window_decision() {
    let limiter = SlidingWindow::new(MemoryStore::new(), 2, 10.0).unwrap();

    let first = limiter.check_at("decision", at(0.0)).unwrap();
    assert!(first.allowed);
    assert_eq!(first.limit, 2);
    assert_eq!(first.remaining, 1);

    let second = limiter.check_at("decision", at(5.0)).unwrap();
    assert!(second.allowed);
    assert_eq!(second.remaining, 0);

    // The request at t=0 frees its slot just after t=10
    let denied = limiter.check_at("decision", at(8.0)).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(
        denied.retry_after,
        Duration::from_secs(2) + Duration::from_micros(1)
    );
}

#[test]
fn test_sliding_window_invalid_parameters() {
    for window in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e-9] {
        assert!(
            matches!(
                SlidingWindow::new(MemoryStore::new(), 10, window),
                Err(LimitError::InvalidConfiguration(_))
            ),
            "window {window} should be rejected"
        );
    }
    assert!(matches!(
        SlidingWindow::new(MemoryStore::new(), 0, 10.0),
        Err(LimitError::InvalidConfiguration(_))
    ));
}

// Token bucket

#[test]
fn test_token_bucket_scenario() {
    let bucket = TokenBucket::new(MemoryStore::new(), 5.0, 1.0).unwrap();

    for i in 0..5 {
        let decision = bucket.check_at("user", at(0.0)).unwrap();
        assert!(decision.allowed, "Request {} should be allowed", i + 1);
        assert_eq!(decision.remaining, 4 - i);
    }

    assert!(!bucket.allow_at("user", at(0.5)).unwrap());
    assert!(bucket.allow_at("user", at(1.0)).unwrap());
}

#[test]
fn test_token_bucket_refill_after_drain() {
    // capacity 3, 2 tokens per second: one token every 0.5s
    let bucket = TokenBucket::new(MemoryStore::new(), 3.0, 2.0).unwrap();

    for _ in 0..3 {
        assert!(bucket.allow_at("drain", at(0.0)).unwrap());
    }
    assert!(!bucket.allow_at("drain", at(0.0)).unwrap());
    assert!(!bucket.allow_at("drain", at(0.25)).unwrap());

    // 1/R seconds after draining a token is back
    assert!(bucket.allow_at("drain", at(0.5)).unwrap());

    // Empty again at t=0.5; C/R = 1.5s later the bucket is full
    for i in 0..3 {
        assert!(
            bucket.allow_at("drain", at(2.0)).unwrap(),
            "Burst request {} should be allowed",
            i + 1
        );
    }
    assert!(!bucket.allow_at("drain", at(2.0)).unwrap());
}

#[test]
fn test_token_bucket_never_exceeds_capacity() {
    let bucket = TokenBucket::new(MemoryStore::new(), 4.0, 10.0).unwrap();

    assert!(bucket.allow_at("idle", at(0.0)).unwrap());

    // A long idle period only refills up to capacity
    let later = at(86_400.0);
    for _ in 0..4 {
        assert!(bucket.allow_at("idle", later).unwrap());
    }
    let denied = bucket.check_at("idle", later).unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.limit, 4);
}

#[test]
fn test_token_bucket_variable_cost() {
    let bucket = TokenBucket::new(MemoryStore::new(), 10.0, 1.0).unwrap();

    let decision = bucket.check_n_at("weighted", 7.0, at(0.0)).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 3);

    let decision = bucket.check_n_at("weighted", 4.0, at(0.0)).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 3);
    assert_eq!(decision.retry_after, Duration::from_secs(1));

    assert!(bucket.check_n_at("weighted", 3.0, at(0.0)).unwrap().allowed);
}

#[test]
fn test_token_bucket_rejects_unsatisfiable_cost() {
    let bucket = TokenBucket::new(MemoryStore::new(), 5.0, 1.0).unwrap();

    assert!(matches!(
        bucket.check_n_at("cost", 6.0, at(0.0)),
        Err(LimitError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        bucket.check_n_at("cost", -1.0, at(0.0)),
        Err(LimitError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        bucket.check_n_at("cost", f64::NAN, at(0.0)),
        Err(LimitError::InvalidConfiguration(_))
    ));

    // A bucket smaller than one token cannot serve unit requests at all
    let tiny = TokenBucket::new(MemoryStore::new(), 0.5, 1.0).unwrap();
    assert!(matches!(
        tiny.allow_at("cost", at(0.0)),
        Err(LimitError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_token_bucket_invalid_parameters() {
    for (capacity, rate) in [(0.0, 1.0), (-5.0, 1.0), (f64::NAN, 1.0), (5.0, 0.0), (5.0, -1.0)] {
        assert!(
            matches!(
                TokenBucket::new(MemoryStore::new(), capacity, rate),
                Err(LimitError::InvalidConfiguration(_))
            ),
            "capacity {capacity}, rate {rate} should be rejected"
        );
    }
}

#[test]
fn test_token_bucket_clock_going_backwards() {
    let bucket = TokenBucket::new(MemoryStore::new(), 1.0, 1.0).unwrap();

    assert!(bucket.allow_at("skew", at(10.0)).unwrap());
    // An older reading earns nothing
    assert!(!bucket.allow_at("skew", at(9.0)).unwrap());
    // ...and does not rewind the refill clock
    assert!(!bucket.allow_at("skew", at(10.5)).unwrap());
    assert!(bucket.allow_at("skew", at(11.0)).unwrap());
}

#[test]
fn test_token_bucket_idle_ttl() {
    let forever = TokenBucket::new(MemoryStore::new(), 2.0, 0.001).unwrap();
    let expiring = TokenBucket::new(MemoryStore::new(), 2.0, 0.001)
        .unwrap()
        .with_idle_ttl(Duration::from_secs(10))
        .unwrap();

    for bucket in [&forever, &expiring] {
        assert!(bucket.allow_at("ttl", at(0.0)).unwrap());
        assert!(bucket.allow_at("ttl", at(0.0)).unwrap());
        assert!(!bucket.allow_at("ttl", at(0.0)).unwrap());
    }

    // Without a TTL the bucket is still nearly empty
    assert!(!forever.allow_at("ttl", at(20.0)).unwrap());
    // With one the store dropped it and it starts full again
    assert!(expiring.allow_at("ttl", at(20.0)).unwrap());
}

#[test]
fn test_token_bucket_rejects_zero_idle_ttl() {
    let result = TokenBucket::new(MemoryStore::new(), 1.0, 0.001)
        .unwrap()
        .with_idle_ttl(Duration::ZERO);
    assert!(matches!(result, Err(LimitError::InvalidConfiguration(_))));

    // The shortest accepted TTL still keeps a drained bucket drained
    let bucket = TokenBucket::new(MemoryStore::new(), 1.0, 0.001)
        .unwrap()
        .with_idle_ttl(Duration::from_nanos(1))
        .unwrap();
    assert!(bucket.allow_at("ttl", at(0.0)).unwrap());
    for i in 0..10 {
        assert!(
            !bucket.allow_at("ttl", at(0.0)).unwrap(),
            "Request {} should be denied",
            i + 2
        );
    }
}

#[test]
fn test_token_bucket_contention_exhaustion() {
    let bucket = TokenBucket::new(RacingStore(MemoryStore::new()), 5.0, 1.0).unwrap();

    assert!(matches!(
        bucket.allow_at("race", at(0.0)),
        Err(LimitError::StoreUnavailable(StoreError::Contention { .. }))
    ));
}

// Shared behaviour

#[test]
fn test_store_failures_propagate() {
    let limiters: Vec<Box<dyn Limiter>> = vec![
        Box::new(FixedWindow::new(FailingStore, 10, 60).unwrap()),
        Box::new(SlidingWindow::new(FailingStore, 10, 60.0).unwrap()),
        Box::new(TokenBucket::new(FailingStore, 10.0, 1.0).unwrap()),
    ];

    for limiter in &limiters {
        assert_eq!(
            limiter.allow_at("down", at(0.0)),
            Err(LimitError::StoreUnavailable(StoreError::Unavailable(
                "connection refused".into()
            )))
        );
    }
}

#[test]
fn test_wrong_type_surfaces_as_store_error() {
    let store = Arc::new(MemoryStore::new());
    let fixed = FixedWindow::new(store.clone(), 10, 60)
        .unwrap()
        .with_namespace("shared");
    let bucket = TokenBucket::new(store, 10.0, 1.0)
        .unwrap()
        .with_namespace("shared");

    assert!(fixed.allow_at("k", at(0.0)).unwrap());

    // "shared:k:{window_id}" now holds a counter
    let window_id = BASE_SECS / 60;
    let result = bucket.allow_at(&format!("k:{window_id}"), at(0.0));
    assert!(matches!(
        result,
        Err(LimitError::StoreUnavailable(StoreError::WrongType { .. }))
    ));
}

#[test]
fn test_failure_policy() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let limiter = FixedWindow::new(FailingStore, 10, 60).unwrap();

    assert_eq!(
        FailurePolicy::Open.resolve(limiter.allow_at("k", at(0.0))),
        Ok(true)
    );
    assert_eq!(
        FailurePolicy::Closed.resolve(limiter.allow_at("k", at(0.0))),
        Ok(false)
    );
    assert_eq!(FailurePolicy::default(), FailurePolicy::Closed);

    // Decisions and configuration errors pass through untouched
    assert_eq!(FailurePolicy::Open.resolve(Ok(false)), Ok(false));
    let invalid = Err(LimitError::InvalidConfiguration("cost".into()));
    assert_eq!(FailurePolicy::Open.resolve(invalid.clone()), invalid);
}

// Concurrency

/// Race `THREADS` callers for the only token of a fresh bucket
fn race_for_single_token<S: CounterStore + 'static>(store: S) -> usize {
    const THREADS: usize = 16;
    let bucket = Arc::new(TokenBucket::new(store, 1.0, 0.001).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));
    let now = at(0.0);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                bucket.allow_at("contended", now).unwrap()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|allowed| *allowed)
        .count()
}

#[test]
fn test_concurrent_token_bucket_single_token() {
    assert_eq!(race_for_single_token(MemoryStore::new()), 1);
}

#[test]
fn test_concurrent_token_bucket_compare_and_set_loop() {
    assert_eq!(race_for_single_token(CasOnlyStore(MemoryStore::new())), 1);
}

#[test]
fn test_concurrent_windows_never_overshoot() {
    const THREADS: usize = 8;
    const CALLS: usize = 50;
    const LIMIT: u64 = 100;

    let store = Arc::new(MemoryStore::new());
    let limiters: Vec<Arc<dyn Limiter>> = vec![
        Arc::new(FixedWindow::new(store.clone(), LIMIT, 60).unwrap()),
        Arc::new(SlidingWindow::new(store, LIMIT, 60.0).unwrap()),
    ];

    for limiter in limiters {
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..CALLS)
                        .filter(|_| limiter.allow_at("shared", at(30.0)).unwrap())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed as u64, LIMIT);
    }
}

// Configuration

#[cfg(feature = "serde")]
mod config_tests {
    use super::at;
    use crate::core::LimitError;
    use crate::core::config::LimiterConfig;
    use crate::core::store::MemoryStore;

    #[test]
    fn test_limiter_config_from_json() {
        let config: LimiterConfig = serde_json::from_str(
            r#"{ "kind": "sliding_window", "limit": 2, "window_seconds": 10, "namespace": "api" }"#,
        )
        .unwrap();
        assert_eq!(
            config,
            LimiterConfig::SlidingWindow {
                limit: 2,
                window_seconds: 10.0,
                namespace: Some("api".to_string()),
            }
        );

        let limiter = config.build(MemoryStore::new()).unwrap();
        assert!(limiter.allow_at("k", at(0.0)).unwrap());
        assert!(limiter.allow_at("k", at(1.0)).unwrap());
        assert!(!limiter.allow_at("k", at(2.0)).unwrap());
    }

    #[test]
    fn test_limiter_config_optional_fields() {
        let config: LimiterConfig =
            serde_json::from_str(r#"{ "kind": "token_bucket", "capacity": 3, "refill_rate": 1 }"#)
                .unwrap();
        assert_eq!(
            config,
            LimiterConfig::TokenBucket {
                capacity: 3.0,
                refill_rate: 1.0,
                namespace: None,
                idle_ttl_seconds: None,
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_limiter_config_rejects_invalid() {
        let config = LimiterConfig::FixedWindow {
            limit: 0,
            window_seconds: 60,
            namespace: None,
        };
        assert!(matches!(
            config.validate(),
            Err(LimitError::InvalidConfiguration(_))
        ));
        assert!(config.build(MemoryStore::new()).is_err());

        assert!(serde_json::from_str::<LimiterConfig>(r#"{ "kind": "leaky_bucket" }"#).is_err());
    }

    #[test]
    fn test_limiter_config_rejects_zero_idle_ttl() {
        let config: LimiterConfig = serde_json::from_str(
            r#"{ "kind": "token_bucket", "capacity": 1, "refill_rate": 0.001, "idle_ttl_seconds": 0 }"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(LimitError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            config.build(MemoryStore::new()),
            Err(LimitError::InvalidConfiguration(_))
        ));
    }

    #[cfg(feature = "settings")]
    #[test]
    fn test_settings_from_toml() {
        use crate::core::FailurePolicy;
        use crate::core::config::Settings;
        use config::{File, FileFormat};
        use std::sync::Arc;

        let toml = r#"
            failure_policy = "open"

            [limiters.login]
            kind = "fixed_window"
            limit = 5
            window_seconds = 60

            [limiters.api]
            kind = "token_bucket"
            capacity = 100
            refill_rate = 10
            idle_ttl_seconds = 3600
        "#;

        let settings = Settings::from_source(File::from_str(toml, FileFormat::Toml)).unwrap();
        assert_eq!(settings.failure_policy, FailurePolicy::Open);
        assert_eq!(settings.limiters.len(), 2);

        let limiters = settings.build_all(Arc::new(MemoryStore::new())).unwrap();
        assert!(limiters["login"].allow_at("user", at(0.0)).unwrap());
        assert!(limiters["api"].allow_at("user", at(0.0)).unwrap());
    }

    #[cfg(feature = "settings")]
    #[test]
    fn test_settings_reject_invalid_limiter() {
        use crate::core::config::Settings;
        use config::{File, FileFormat};

        let toml = r#"
            [limiters.broken]
            kind = "sliding_window"
            limit = 10
            window_seconds = 0
        "#;

        let result = Settings::from_source(File::from_str(toml, FileFormat::Toml));
        assert!(matches!(result, Err(LimitError::InvalidConfiguration(_))));
    }
}
