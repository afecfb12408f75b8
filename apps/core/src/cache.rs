use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded least-recently-used store with hit/miss accounting.
///
/// Reads refresh recency; inserting into a full cache evicts the entry that
/// was touched longest ago.
pub struct LruCache<K: Hash + Eq, V> {
    inner: lru::LruCache<K, V>,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: lru::LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.inner.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.inner.len(),
            capacity: self.capacity(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// Single-slot cache whose value expires a fixed interval after it was loaded.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Option<(Instant, T)>,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        match &self.slot {
            Some((loaded_at, _)) => now.saturating_duration_since(*loaded_at) < self.ttl,
            None => false,
        }
    }

    pub fn get_or_load<F>(&mut self, loader: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.get_or_load_at(Instant::now(), loader)
    }

    pub fn get_or_load_at<F>(&mut self, now: Instant, loader: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if !self.is_fresh(now) {
            self.slot = None;
        }
        &self.slot.get_or_insert_with(|| (now, loader())).1
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}
