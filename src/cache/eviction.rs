//! Eviction Policy Module
//!
//! Capacity enforcement (least recently used first) and expiry sweeping.
//! Both operate on an already locked [`Entries`] so they compose with an
//! insert under a single exclusive lock.

use tracing::debug;

use crate::cache::{CacheKey, Entries};

// == Enforce Capacity ==
/// Evicts least recently used entries until `incoming_size` more bytes fit
/// within `max_capacity`, or nothing is left to evict.
///
/// An incoming entry larger than `max_capacity` empties the store; the
/// caller still inserts it, so the budget is a soft target that at most one
/// oversized entry can exceed.
///
/// Returns the evicted keys, oldest first.
pub fn enforce_capacity<V>(
    entries: &mut Entries<V>,
    incoming_size: usize,
    max_capacity: usize,
) -> Vec<CacheKey> {
    let mut evicted = Vec::new();

    while entries.total_size().saturating_add(incoming_size) > max_capacity {
        let Some(victim) = entries.lru_candidate().cloned() else {
            break;
        };
        if let Some(removed) = entries.remove(&victim) {
            debug!(
                key = %victim,
                size_bytes = removed.size_bytes,
                "evicted least recently used entry"
            );
        }
        evicted.push(victim);
    }

    evicted
}

// == Sweep Expired ==
/// Removes every entry with `now_ms >= expires_at`.
///
/// Returns the removed keys.
pub fn sweep_expired<V>(entries: &mut Entries<V>, now_ms: u64) -> Vec<CacheKey> {
    let expired: Vec<CacheKey> = entries
        .iter()
        .filter(|entry| entry.is_expired_at(now_ms))
        .map(|entry| entry.key.clone())
        .collect();

    // A key that vanished in between is skipped, the rest still go
    expired
        .into_iter()
        .filter(|key| entries.remove(key).is_some())
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{derive_key, CacheEntry};
    use std::time::Duration;

    fn k(name: &str) -> CacheKey {
        derive_key(name, &[])
    }

    fn entry(name: &str, size: usize, ttl_ms: u64) -> CacheEntry<()> {
        CacheEntry::with_size(k(name), (), 1_000, Duration::from_millis(ttl_ms), size)
    }

    #[test]
    fn test_no_eviction_when_it_fits() {
        let mut entries = Entries::default();
        entries.insert(entry("a", 40, 60_000));

        let evicted = enforce_capacity(&mut entries, 60, 100);

        assert!(evicted.is_empty());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used_first() {
        let mut entries = Entries::default();
        entries.insert(entry("a", 40, 60_000));
        entries.insert(entry("b", 40, 60_000));
        entries.touch(&k("a"), 1_001);

        let evicted = enforce_capacity(&mut entries, 40, 100);

        assert_eq!(evicted, vec![k("b")]);
        assert!(entries.get(&k("a")).is_some());
        assert_eq!(entries.total_size(), 40);
    }

    #[test]
    fn test_evicts_several_until_it_fits() {
        let mut entries = Entries::default();
        for name in ["a", "b", "c", "d"] {
            entries.insert(entry(name, 25, 60_000));
        }

        let evicted = enforce_capacity(&mut entries, 60, 100);

        assert_eq!(evicted, vec![k("a"), k("b"), k("c")]);
        assert_eq!(entries.total_size(), 25);
    }

    #[test]
    fn test_oversized_incoming_empties_store() {
        let mut entries = Entries::default();
        entries.insert(entry("a", 10, 60_000));
        entries.insert(entry("b", 10, 60_000));

        let evicted = enforce_capacity(&mut entries, 500, 100);

        assert_eq!(evicted.len(), 2);
        assert!(entries.is_empty());
        assert_eq!(entries.total_size(), 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut entries = Entries::default();
        entries.insert(entry("short", 10, 500));
        entries.insert(entry("boundary", 10, 1_000));
        entries.insert(entry("long", 10, 60_000));

        let removed = sweep_expired(&mut entries, 2_000);

        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&k("short")));
        assert!(removed.contains(&k("boundary")));
        assert!(entries.get(&k("long")).is_some());
        assert_eq!(entries.total_size(), 10);
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let mut entries: Entries<()> = Entries::default();
        assert!(sweep_expired(&mut entries, u64::MAX).is_empty());
    }
}
