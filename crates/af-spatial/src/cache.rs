//! Content-addressed memo cache
//!
//! Results are keyed by a SHA-256 over a function identity and its argument
//! values. Entries are immutable once written; failed computations are never
//! stored.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Canonical hash of a function call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Start a key for the named function
    pub fn builder(function: &str) -> CacheKeyBuilder {
        CacheKeyBuilder::new(function)
    }

    /// Raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log output
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl From<[u8; 32]> for CacheKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Incremental key builder
///
/// Every value is tagged and slices are length-prefixed, so different
/// argument lists never feed the hasher the same byte stream.
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    fn new(function: &str) -> Self {
        let mut builder = Self {
            hasher: Sha256::new(),
        };
        builder.tagged(b'F', function.as_bytes());
        builder
    }

    fn tagged(&mut self, tag: u8, bytes: &[u8]) {
        self.hasher.update([tag]);
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Add a float
    pub fn f64(mut self, value: f64) -> Self {
        self.tagged(b'd', &value.to_le_bytes());
        self
    }

    /// Add an integer
    pub fn u64(mut self, value: u64) -> Self {
        self.tagged(b'u', &value.to_le_bytes());
        self
    }

    /// Add a string
    pub fn str(mut self, value: &str) -> Self {
        self.tagged(b's', value.as_bytes());
        self
    }

    /// Add a float slice
    pub fn f64s(mut self, values: &[f64]) -> Self {
        self.hasher.update([b'D']);
        self.hasher.update((values.len() as u64).to_le_bytes());
        for v in values {
            self.hasher.update(v.to_le_bytes());
        }
        self
    }

    /// Add the digest of a nested value
    pub fn nested(mut self, hash: &[u8; 32]) -> Self {
        self.tagged(b'h', hash);
        self
    }

    /// Finalize
    pub fn finish(self) -> CacheKey {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&self.hasher.finalize());
        CacheKey(hash)
    }
}

/// Eviction policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep every entry for the lifetime of the cache
    #[default]
    Unbounded,
    /// Evict the least recently used entry beyond `capacity`
    Lru { capacity: usize },
}

struct CacheEntry<T> {
    value: Arc<T>,
    last_access: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that had to compute
    pub misses: u64,
    /// Stored entries
    pub entries: usize,
}

/// Thread-safe memo cache
pub struct MemoCache<T> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<T>>>,
    policy: CachePolicy,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> MemoCache<T> {
    /// Create with a policy
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Active policy
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up without computing
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let now = self.tick();
        let mut entries = self.entries.write();
        entries.get_mut(key).map(|entry| {
            entry.last_access = now;
            Arc::clone(&entry.value)
        })
    }

    /// Return the cached value or compute, store and return it
    ///
    /// The closure runs outside the lock. An `Err` is passed through and
    /// nothing is stored.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: CacheKey,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Cache hit {}", key.short_hex());
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = Arc::new(f()?);
        self.insert_arc(key, Arc::clone(&value));
        Ok(value)
    }

    /// Store a value
    pub fn insert(&self, key: CacheKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.insert_arc(key, Arc::clone(&value));
        value
    }

    fn insert_arc(&self, key: CacheKey, value: Arc<T>) {
        let now = self.tick();
        let mut entries = self.entries.write();

        let full = match self.policy {
            CachePolicy::Unbounded => false,
            CachePolicy::Lru { capacity } => {
                !entries.contains_key(&key) && entries.len() >= capacity.max(1)
            }
        };
        if full {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                log::debug!("Cache evict {}", oldest.short_hex());
                entries.remove(&oldest);
            }
        }

        // first writer wins; entries are immutable
        entries.entry(key).or_insert(CacheEntry {
            value,
            last_access: now,
        });
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Hit/miss counters and entry count
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl<T> Default for MemoCache<T> {
    fn default() -> Self {
        Self::new(CachePolicy::Unbounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: f64) -> CacheKey {
        CacheKey::builder("test").f64(x).finish()
    }

    #[test]
    fn test_key_is_content_addressed() {
        let a = CacheKey::builder("f").f64s(&[1.0, 2.0]).u64(3).finish();
        let b = CacheKey::builder("f").f64s(&[1.0, 2.0]).u64(3).finish();
        let c = CacheKey::builder("g").f64s(&[1.0, 2.0]).u64(3).finish();
        let d = CacheKey::builder("f").f64s(&[1.0]).f64s(&[2.0]).u64(3).finish();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.short_hex().len(), 16);
    }

    #[test]
    fn test_memoizes_success_only() {
        let cache: MemoCache<f64> = MemoCache::default();

        let err: Result<_, &str> = cache.get_or_try_insert_with(key(1.0), || Err("boom"));
        assert!(err.is_err());
        assert!(cache.is_empty());

        let mut calls = 0;
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with::<()>(key(1.0), || {
                    calls += 1;
                    Ok(42.0)
                })
                .unwrap();
            assert_eq!(*v, 42.0);
        }
        assert_eq!(calls, 1);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoCache::new(CachePolicy::Lru { capacity: 2 });
        cache.insert(key(1.0), 1);
        cache.insert(key(2.0), 2);
        assert!(cache.get(&key(1.0)).is_some());
        cache.insert(key(3.0), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1.0)).is_some());
        assert!(cache.get(&key(2.0)).is_none());
        assert!(cache.get(&key(3.0)).is_some());
    }
}
