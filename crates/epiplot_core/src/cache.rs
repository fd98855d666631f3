//! Process-lifetime memoization with LRU eviction.

use cached::{Cached, SizedCache};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Cache key for a coordinate pair. Compares by bit pattern with `-0.0`
/// folded into `0.0`, so `f64` inputs can be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey(u64, u64);

impl CoordinateKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(normalized_bits(latitude), normalized_bits(longitude))
    }
}

fn normalized_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// A size-bounded memo table shared behind a mutex.
///
/// Entries are immutable once inserted; a failed computation leaves the
/// table untouched so the next call retries.
pub struct BoundedCache<K, V> {
    store: Mutex<SizedCache<K, V>>,
    capacity: usize,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            store: Mutex::new(SizedCache::with_size(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().cache_get(key).is_some()
    }

    /// Returns the cached value for `key`, or computes and stores it.
    ///
    /// The lock is released while `compute` runs, so two callers racing on
    /// the same key may both compute; the later insert wins.
    pub fn get_or_compute<E>(&self, key: K, compute: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(hit) = self.lock().cache_get(&key).cloned() {
            trace!("cache hit");
            return Ok(hit);
        }
        trace!("cache miss");
        let value = compute()?;
        self.lock().cache_set(key, value.clone());
        Ok(value)
    }

    fn lock(&self) -> MutexGuard<'_, SizedCache<K, V>> {
        // Entries are never left half-written, so a poisoned lock is still usable.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
