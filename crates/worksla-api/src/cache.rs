use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A small in-memory TTL cache with lazy expiry.
///
/// Entries are dropped on read once stale; when the map reaches capacity the
/// entry closest to expiry is evicted. Key cardinality here is low (listing
/// parameter tuples and work-item ids), so linear scans are fine and no
/// background sweeper is needed.
pub struct TtlCache<K, V> {
    map: DashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            map: DashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.map.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.map.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict_one();
        }
        self.map.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry. Used on credential rotation, where anything fetched
    /// under the old credentials is unsafe to serve.
    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    // Evicts the entry closest to expiry, which is also the first to go
    // stale. Stale entries are therefore always preferred victims.
    fn evict_one(&self) {
        let victim = self
            .map
            .iter()
            .min_by_key(|e| e.expires_at)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.map.remove(&key);
        }
    }
}
