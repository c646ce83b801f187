//! ClusterSizeCache — memoized per-cluster member counts.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{ClusterId, Generation};

/// Identifies one cached count.
///
/// `revision` is bumped by the owning store whenever the membership of
/// the active generation changes (a swap or an enrollment). A count
/// computed under an older revision is never looked up again, so a
/// computation that races a swap can only ever populate a dead key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeKey {
    pub generation: Generation,
    pub revision: u64,
    pub cluster: ClusterId,
}

/// Point-in-time counters for a [`ClusterSizeCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// Lazily populated map of `(generation, cluster) → member count`.
///
/// Entries are created on first query and dropped wholesale by
/// [`invalidate_all`](Self::invalidate_all); there is no per-entry
/// invalidation.
#[derive(Debug, Default)]
pub struct ClusterSizeCache {
    sizes: DashMap<SizeKey, usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ClusterSizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached count for `key`, or `compute()` stored under `key`.
    ///
    /// `compute` runs without holding any cache lock. Two readers missing
    /// the same key may both compute; they produce the same value because
    /// a key pins both the generation and its membership revision.
    pub fn get_or_compute(&self, key: SizeKey, compute: impl FnOnce() -> usize) -> usize {
        if let Some(size) = self.sizes.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *size;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let size = compute();
        debug!(
            cluster = key.cluster,
            epoch = key.generation.epoch,
            revision = key.revision,
            size,
            "cluster size cache miss"
        );
        self.sizes.insert(key, size);
        size
    }

    /// Cached count for `key` without computing.
    pub fn peek(&self, key: &SizeKey) -> Option<usize> {
        self.sizes.get(key).map(|s| *s)
    }

    /// Drop entries computed under a revision older than `revision`.
    pub fn evict_before(&self, revision: u64) {
        self.sizes.retain(|key, _| key.revision >= revision);
    }

    /// Drop every entry regardless of generation.
    pub fn invalidate_all(&self) {
        self.sizes.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.sizes.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn key(epoch: u64, cluster: ClusterId) -> SizeKey {
        SizeKey { generation: Generation { epoch }, revision: epoch, cluster }
    }

    #[test]
    fn computes_once_then_hits() {
        let cache = ClusterSizeCache::new();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            42
        };

        assert_eq!(cache.get_or_compute(key(0, 1), compute), 42);
        assert_eq!(cache.get_or_compute(key(0, 1), || unreachable!()), 42);
        assert_eq!(calls.get(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn keys_are_scoped_by_generation() {
        let cache = ClusterSizeCache::new();
        cache.get_or_compute(key(0, 3), || 10);
        assert_eq!(cache.get_or_compute(key(1, 3), || 4), 4);
        assert_eq!(cache.peek(&key(0, 3)), Some(10));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_all_clears_every_generation() {
        let cache = ClusterSizeCache::new();
        cache.get_or_compute(key(0, 0), || 1);
        cache.get_or_compute(key(1, 0), || 2);
        cache.invalidate_all();

        assert!(cache.is_empty());
        assert_eq!(cache.peek(&key(0, 0)), None);
        assert_eq!(cache.stats().invalidations, 1);
        assert_eq!(cache.get_or_compute(key(0, 0), || 7), 7);
    }

    #[test]
    fn evict_before_keeps_current_revision() {
        let cache = ClusterSizeCache::new();
        cache.get_or_compute(key(0, 0), || 1);
        cache.get_or_compute(key(2, 0), || 2);
        cache.evict_before(1);

        assert_eq!(cache.peek(&key(0, 0)), None);
        assert_eq!(cache.peek(&key(2, 0)), Some(2));
        assert_eq!(cache.stats().invalidations, 0);
    }
}
