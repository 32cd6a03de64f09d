//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the in-process store against its limits, expiry and
//! accounting rules.

use proptest::prelude::*;
use std::thread::sleep;
use std::time::Duration;

use crate::cache::{entry_size, Lookup, MemoryStore, CacheStore, MemoryCache, Cache};
use crate::error::CacheError;

const LONG_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}"
}

/// Generates values of varied size, including ones bigger than small limits
fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Vec<u8> },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (valid_key_strategy(), value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        1 => valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Size and count never exceed the configured bounds; a write that cannot
    // fit is rejected instead.
    #[test]
    fn prop_limits_never_exceeded(
        max_bytes in prop_oneof![Just(0u64), 100u64..4096],
        max_items in prop_oneof![Just(0usize), 1usize..20],
        ops in prop::collection::vec(cache_op_strategy(), 1..80),
    ) {
        let mut store = MemoryStore::new(max_bytes, max_items);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let size = entry_size(&key, &value);
                    match store.insert(&key, value, LONG_TTL) {
                        Ok(()) => {
                            prop_assert!(matches!(store.lookup(&key), Lookup::Live(_)));
                        }
                        Err(CacheError::LimitExceeded(_)) => {
                            prop_assert!(max_bytes > 0 && size > max_bytes);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                    }
                }
                CacheOp::Get { key } => {
                    let _ = store.lookup(&key);
                }
                CacheOp::Delete { key } => {
                    store.remove(&key);
                }
            }

            if max_bytes > 0 {
                prop_assert!(store.memory_bytes() <= max_bytes);
            }
            if max_items > 0 {
                prop_assert!(store.len() <= max_items);
            }
        }
    }

    // Byte accounting always equals the sum of the live entries.
    #[test]
    fn prop_memory_accounting_matches_contents(
        ops in prop::collection::vec(cache_op_strategy(), 1..60),
    ) {
        let mut store = MemoryStore::new(0, 0);
        let mut model = std::collections::HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.insert(&key, value.clone(), LONG_TTL).unwrap();
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    let found = matches!(store.lookup(&key), Lookup::Live(_));
                    prop_assert_eq!(found, model.contains_key(&key));
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(store.remove(&key), model.remove(&key).is_some());
                }
            }
        }

        let expected: u64 = model.iter().map(|(k, v)| entry_size(k, v)).sum();
        prop_assert_eq!(store.memory_bytes(), expected);
        prop_assert_eq!(store.len(), model.len());
    }

    // Hits and misses reflect every read.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = MemoryStore::new(0, 0);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let _ = store.insert(&key, value, LONG_TTL);
                }
                CacheOp::Get { key } => match store.lookup(&key) {
                    Lookup::Live(_) => expected_hits += 1,
                    _ => expected_misses += 1,
                },
                CacheOp::Delete { key } => {
                    store.remove(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.items, store.len(), "Item count mismatch");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    // A key is readable before its TTL elapses and absent after.
    #[test]
    fn prop_ttl_expiration(
        key in valid_key_strategy(),
        value in value_strategy(),
        ttl_ms in 20u64..60,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        runtime.block_on(async {
            let cache = Cache::from(MemoryCache::new(0, 0));
            cache.set(&key, value.clone(), Duration::from_millis(ttl_ms)).await.unwrap();

            prop_assert_eq!(cache.get(&key).await.unwrap(), value);

            sleep(Duration::from_millis(ttl_ms + 20));

            let result = cache.get(&key).await;
            prop_assert!(result.as_ref().err().map(|e| e.is_miss()).unwrap_or(false));
            prop_assert!(matches!(cache.get(&key).await, Err(CacheError::NotFound(_))));

            cache.close().await;
            Ok(())
        })?;
    }
}
