#[cfg(test)]
mod tests {
    use crate::core::store::{CounterStore, MemoryStore, MemoryStoreBuilder};
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_memory_store_builder() {
        let store = MemoryStore::builder()
            .capacity(50_000)
            .shards(32)
            .cleanup_interval(Duration::from_secs(120))
            .build();

        // Test basic functionality
        let now = SystemTime::now();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.shard_count(), 32);
        assert_eq!(store.increment_and_expire("test_key", ttl, now).unwrap(), 1);
        assert_eq!(store.increment_and_expire("test_key", ttl, now).unwrap(), 2);
    }

    #[test]
    fn test_memory_store_builder_defaults() {
        let store = MemoryStore::builder().build();

        // Should work with default values
        let now = SystemTime::now();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.shard_count(), 16);
        assert_eq!(store.increment_and_expire("key1", ttl, now).unwrap(), 1);
        assert_eq!(MemoryStore::new().shard_count(), 16);
        assert_eq!(MemoryStore::default().shard_count(), 16);
    }

    #[test]
    fn test_shard_count_rounds_to_power_of_two() {
        for (requested, expected) in [(0, 1), (1, 1), (3, 4), (5, 8), (16, 16), (17, 32)] {
            let store = MemoryStoreBuilder::new().shards(requested).build();
            assert_eq!(
                store.shard_count(),
                expected,
                "{requested} shards should round to {expected}"
            );
        }
    }

    #[test]
    fn test_with_capacity() {
        let store = MemoryStore::with_capacity(10);
        let now = SystemTime::now();

        // Capacity is a sizing hint, not a cap
        for i in 0..100 {
            let key = format!("key_{i}");
            store
                .increment_and_expire(&key, Duration::from_secs(60), now)
                .unwrap();
        }
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_builder_cleanup_interval() {
        let store = MemoryStore::builder()
            .shards(1)
            .cleanup_interval(Duration::from_secs(5))
            .build();
        let now = SystemTime::now();

        for i in 0..10 {
            let key = format!("short_{i}");
            store
                .increment_and_expire(&key, Duration::from_secs(1), now)
                .unwrap();
        }

        // A shorter interval sweeps sooner
        store
            .increment_and_expire("trigger", Duration::from_secs(60), now + Duration::from_secs(6))
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.expired_count(), 10);
    }
}
