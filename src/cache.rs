use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::model::{GraphId, GraphSnapshot};

pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

struct CachedSnapshot {
    snapshot: Arc<GraphSnapshot>,
    last_used: AtomicU64,
}

/// Bounded read-through cache of graph snapshots keyed by graph id.
///
/// A stored graph only ever changes by losing nodes, so its node count
/// identifies its state. Callers read the current count from storage and
/// pass it to [`SnapshotCache::get`]; an entry with a different count is a
/// miss. Writes from other stores or processes sharing the database are
/// therefore never served stale.
///
/// Once `capacity` entries are held, inserting a new graph evicts the least
/// recently used one.
pub struct SnapshotCache {
    inner: RwLock<AHashMap<GraphId, CachedSnapshot>>,
    capacity: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SnapshotCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(AHashMap::with_capacity(capacity.min(1024))),
            capacity,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the cached snapshot when it still has `node_count` nodes.
    pub fn get(&self, id: GraphId, node_count: usize) -> Option<Arc<GraphSnapshot>> {
        let guard = self.inner.read();
        let found = guard
            .get(&id)
            .filter(|entry| entry.snapshot.nodes.len() == node_count)
            .map(|entry| {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                Arc::clone(&entry.snapshot)
            });
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, id: GraphId, snapshot: Arc<GraphSnapshot>) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.inner.write();
        if !guard.contains_key(&id) && guard.len() >= self.capacity {
            let oldest = guard
                .iter()
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                guard.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        guard.insert(
            id,
            CachedSnapshot {
                snapshot,
                last_used: AtomicU64::new(self.tick()),
            },
        );
    }

    pub fn invalidate(&self, id: GraphId) {
        self.inner.write().remove(&id);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.inner.read().len(),
            capacity: self.capacity,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: i64, nodes: &[&str]) -> Arc<GraphSnapshot> {
        Arc::new(GraphSnapshot {
            id: GraphId(id),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            edges: Vec::new(),
        })
    }

    #[test]
    fn insert_and_hit() {
        let cache = SnapshotCache::new(4);
        assert!(cache.get(GraphId(1), 1).is_none());
        cache.insert(GraphId(1), snapshot(1, &["a"]));
        assert_eq!(cache.get(GraphId(1), 1).unwrap().id, GraphId(1));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn node_count_mismatch_is_a_miss() {
        let cache = SnapshotCache::new(4);
        cache.insert(GraphId(7), snapshot(7, &["a", "b"]));
        assert!(cache.get(GraphId(7), 1).is_none());
        assert!(cache.get(GraphId(7), 0).is_none());
        assert!(cache.get(GraphId(7), 2).is_some());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn entries_never_exceed_capacity() {
        let cache = SnapshotCache::new(3);
        for id in 1..=10 {
            cache.insert(GraphId(id), snapshot(id, &["a"]));
            assert!(cache.stats().entries <= 3);
        }
        let stats = cache.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.evictions, 7);
        assert_eq!(stats.capacity, 3);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = SnapshotCache::new(2);
        cache.insert(GraphId(1), snapshot(1, &["a"]));
        cache.insert(GraphId(2), snapshot(2, &["a"]));
        assert!(cache.get(GraphId(1), 1).is_some());
        cache.insert(GraphId(3), snapshot(3, &["a"]));
        assert!(cache.get(GraphId(1), 1).is_some());
        assert!(cache.get(GraphId(2), 1).is_none());
        assert!(cache.get(GraphId(3), 1).is_some());
    }

    #[test]
    fn replacing_an_entry_does_not_evict() {
        let cache = SnapshotCache::new(2);
        cache.insert(GraphId(1), snapshot(1, &["a", "b"]));
        cache.insert(GraphId(2), snapshot(2, &["a"]));
        cache.insert(GraphId(1), snapshot(1, &["a"]));
        let stats = cache.stats();
        assert_eq!((stats.entries, stats.evictions), (2, 0));
        assert!(cache.get(GraphId(1), 1).is_some());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = SnapshotCache::new(0);
        cache.insert(GraphId(1), snapshot(1, &["a"]));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = SnapshotCache::new(4);
        cache.insert(GraphId(1), snapshot(1, &["a"]));
        cache.insert(GraphId(2), snapshot(2, &["a"]));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }
}
