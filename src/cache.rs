//! Memoization for option lists and envelopes.
//!
//! The index never changes after it is built, so entries are never
//! invalidated. Each key gets its own `OnceLock`; the map lock only guards
//! finding that cell, so a slow computation for one key does not block
//! lookups of other keys, and concurrent callers of the same key wait for
//! the single computation instead of repeating it.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct LookupCache<K, V> {
    name: &'static str,
    cells: Mutex<HashMap<K, Arc<OnceLock<Arc<V>>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + std::fmt::Debug,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cells: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, running `compute` if there is
    /// none yet. `compute` runs at most once per key.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            if !cells.contains_key(&key) {
                debug!(cache = self.name, ?key, "Cache miss");
            }
            Arc::clone(cells.entry(key).or_default())
        };

        let mut computed = false;
        let value = cell.get_or_init(|| {
            computed = true;
            Arc::new(compute())
        });

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Arc::clone(value)
    }

    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_computes_once_per_key() {
        let cache: LookupCache<(u32, u8), Vec<u32>> = LookupCache::new("test");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache.get_or_compute((1, 2), || {
                calls.fetch_add(1, Ordering::SeqCst);
                vec![1, 2, 3]
            });
            assert_eq!(*value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 2,
                misses: 1
            }
        );
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let cache: LookupCache<&str, String> = LookupCache::new("test");

        let a = cache.get_or_compute("a", || "first".to_string());
        let b = cache.get_or_compute("b", || "second".to_string());

        assert_eq!(a.as_str(), "first");
        assert_eq!(b.as_str(), "second");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_returns_shared_value() {
        let cache: LookupCache<u8, Vec<f64>> = LookupCache::new("test");

        let first = cache.get_or_compute(0, || vec![1.0]);
        let second = cache.get_or_compute(0, || vec![2.0]);

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_callers_compute_once() {
        let cache: LookupCache<u32, u64> = LookupCache::new("test");
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    let value = cache.get_or_compute(7, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        42
                    });
                    assert_eq!(*value, 42);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
    }

    #[test]
    fn test_empty_cache() {
        let cache: LookupCache<u32, u32> = LookupCache::new("test");
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
