//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check key derivation, capacity, LRU and statistics
//! properties over generated operation sequences.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use crate::cache::{
    derive_key, enforce_capacity, CacheController, CacheEntry, CacheKey, Entries, ManualClock, Param,
};
use crate::config::CacheConfig;

// == Test Configuration ==
const TEST_CAPACITY: usize = 512;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
fn query_strategy() -> impl Strategy<Value = String> {
    "SELECT [a-z_:$0-9]{1,16} FROM [a-z0-9:]{1,8}"
}

fn params_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(any::<i64>(), 0..4)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,200}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { slot: u8, value: String },
    Lookup { slot: u8 },
    Invalidate { slot: u8 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (0u8..12, value_strategy()).prop_map(|(slot, value)| CacheOp::Put { slot, value }),
        (0u8..12).prop_map(|slot| CacheOp::Lookup { slot }),
        (0u8..12).prop_map(|slot| CacheOp::Invalidate { slot }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn controller(capacity: usize) -> CacheController<String> {
    let config = CacheConfig {
        max_capacity_bytes: capacity,
        default_ttl: TEST_TTL,
        ..CacheConfig::default()
    };
    CacheController::builder(config)
        .clock(Arc::new(ManualClock::new(1_000)))
        .build()
        .unwrap()
}

fn key_for(slot: u8) -> CacheKey {
    derive_key("SELECT * FROM slots WHERE id = $1", &[&slot])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Derivation is a pure function of query text and ordered params
    #[test]
    fn prop_key_derivation_is_deterministic(query in query_strategy(), params in params_strategy()) {
        let refs: Vec<Param<'_>> = params.iter().map(|p| p as Param<'_>).collect();
        prop_assert_eq!(derive_key(&query, &refs), derive_key(&query, &refs));
    }

    #[test]
    fn prop_key_derivation_is_order_sensitive(query in query_strategy(), a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        prop_assert_ne!(derive_key(&query, &[&a, &b]), derive_key(&query, &[&b, &a]));
    }

    #[test]
    fn prop_key_derivation_separates_params(query in query_strategy(), a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        prop_assert_ne!(derive_key(&query, &[&a]), derive_key(&query, &[&b]));
    }

    #[test]
    fn prop_key_derivation_separates_queries(a in query_strategy(), b in query_strategy(), params in params_strategy()) {
        prop_assume!(a != b);
        let refs: Vec<Param<'_>> = params.iter().map(|p| p as Param<'_>).collect();
        prop_assert_ne!(derive_key(&a, &refs), derive_key(&b, &refs));
    }

    // A query spelling out a framed param is still a different query
    #[test]
    fn prop_query_text_cannot_forge_params(query in query_strategy(), param in any::<i64>()) {
        let text = param.to_string();
        let forged = format!("{}:{}:{}", query, text.len(), text);
        prop_assert_ne!(derive_key(&query, &[&param]), derive_key(&forged, &[]));
    }

    // After any insert the summed size is within budget, or a single
    // oversized entry is stored alone
    #[test]
    fn prop_capacity_bound(sizes in prop::collection::vec(1usize..300, 1..60)) {
        let mut entries = Entries::default();

        for (i, size) in sizes.into_iter().enumerate() {
            let key = derive_key("q", &[&i]);
            enforce_capacity(&mut entries, size, TEST_CAPACITY / 2);
            entries.insert(CacheEntry::with_size(key, (), 0, TEST_TTL, size));

            prop_assert!(
                entries.total_size() <= TEST_CAPACITY / 2
                    || (entries.len() == 1 && entries.total_size() == size),
                "total {} with {} entries exceeds budget",
                entries.total_size(),
                entries.len()
            );
            let summed: usize = entries.iter().map(|e| e.size_bytes).sum();
            prop_assert_eq!(summed, entries.total_size());
        }
    }

    // The least recently touched entry is always the one evicted
    #[test]
    fn prop_lru_eviction_order(count in 3usize..10, touched in 0usize..10) {
        let touched = touched % count;
        let mut entries = Entries::default();
        let keys: Vec<CacheKey> = (0..count).map(|i| derive_key("q", &[&i])).collect();

        for key in &keys {
            entries.insert(CacheEntry::with_size(key.clone(), (), 0, TEST_TTL, 10));
        }
        entries.touch(&keys[touched], 1);

        let evicted = enforce_capacity(&mut entries, 10, count * 10);
        let expected = if touched == 0 { &keys[1] } else { &keys[0] };

        prop_assert_eq!(evicted, vec![expected.clone()]);
        prop_assert!(entries.get(&keys[touched]).is_some());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    // Hits and misses match what the caller observed
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        runtime().block_on(async {
            let cache = controller(TEST_CAPACITY * 1024);
            let mut expected_hits = 0u64;
            let mut expected_misses = 0u64;

            for op in ops {
                match op {
                    CacheOp::Put { slot, value } => {
                        cache
                            .put("SELECT * FROM slots WHERE id = $1", &[&slot], value, None, |_| async {
                                Ok::<_, std::io::Error>(())
                            })
                            .await
                            .unwrap();
                    }
                    CacheOp::Lookup { slot } => match cache.lookup_key(&key_for(slot)).await {
                        Some(_) => expected_hits += 1,
                        None => expected_misses += 1,
                    },
                    CacheOp::Invalidate { slot } => {
                        cache.invalidate_key(&key_for(slot)).await;
                    }
                }
            }

            let stats = cache.stats();
            prop_assert_eq!(stats.hits, expected_hits);
            prop_assert_eq!(stats.misses, expected_misses);
            prop_assert_eq!(stats.current_count, cache.len().await);
            prop_assert_eq!(stats.evictions, 0);

            cache.shutdown().await;
            Ok(())
        })?;
    }

    // Last write wins and only one entry exists per key
    #[test]
    fn prop_overwrite_semantics(first in value_strategy(), second in value_strategy()) {
        runtime().block_on(async {
            let cache = controller(TEST_CAPACITY);
            let ok = |_: String| async { Ok::<_, std::io::Error>(()) };

            cache.put("SELECT 1", &[], first, None, ok).await.unwrap();
            cache.put("SELECT 1", &[], second.clone(), None, ok).await.unwrap();

            prop_assert_eq!(cache.lookup("SELECT 1", &[]).await, Some(second.clone()));
            prop_assert_eq!(cache.len().await, 1);
            prop_assert_eq!(cache.stats().current_size, second.len() + 2);

            cache.shutdown().await;
            Ok(())
        })?;
    }

    // Capacity holds through the controller with real serialized sizes
    #[test]
    fn prop_controller_capacity_bound(values in prop::collection::vec(value_strategy(), 1..40)) {
        runtime().block_on(async {
            let cache = controller(TEST_CAPACITY);

            for (i, value) in values.into_iter().enumerate() {
                let size = value.len() + 2;
                cache
                    .get_or_compute("SELECT $1", &[&i], None, || async move {
                        Ok::<_, std::io::Error>(value)
                    })
                    .await
                    .unwrap();

                let stats = cache.stats();
                prop_assert!(
                    stats.current_size <= TEST_CAPACITY
                        || (stats.current_count == 1 && stats.current_size == size)
                );
            }

            cache.shutdown().await;
            Ok(())
        })?;
    }
}
