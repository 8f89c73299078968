//! Bounded, recency-ordered cache of loaded tiles.

use std::collections::VecDeque;

/// Default number of tiles kept per tile manager.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64;

/// Fixed-capacity cache that evicts the least recently inserted or touched entry.
///
/// Entries are kept oldest first. There is no pinning: a tile that is still in
/// view survives only because the streamer touches it on every pass.
#[derive(Debug)]
pub struct SpatialTileCache<K, V> {
    capacity: usize,
    entries: VecDeque<(K, V)>,
}

impl<K: PartialEq, V> SpatialTileCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    /// Marks `key` as most recently used. Returns false if it is not cached.
    pub fn touch(&mut self, key: &K) -> bool {
        match self.position(key) {
            Some(i) => {
                if let Some(entry) = self.entries.remove(i) {
                    self.entries.push_back(entry);
                }
                true
            }
            None => false,
        }
    }

    /// Inserts or replaces `key` as the most recent entry.
    ///
    /// Returns the entries evicted to stay within capacity, oldest first.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        if let Some(i) = self.position(&key) {
            self.entries.remove(i);
        }
        self.entries.push_back((key, value));

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.position(key)?;
        self.entries.remove(i).map(|(_, value)| value)
    }

    /// Values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut cache = SpatialTileCache::new(3);
        assert!(cache.insert(1, "a").is_empty());
        assert!(cache.insert(2, "b").is_empty());
        assert!(cache.insert(3, "c").is_empty());
        let evicted = cache.insert(4, "d");
        assert_eq!(evicted, vec![(1, "a")]);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&1));
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let mut cache = SpatialTileCache::new(2);
        cache.insert(1, ());
        cache.insert(2, ());
        assert!(cache.touch(&1));
        let evicted = cache.insert(3, ());
        assert_eq!(evicted, vec![(2, ())]);
        assert!(cache.contains(&1));
        assert!(!cache.touch(&2));
    }

    #[test]
    fn test_reinsert_replaces_value() {
        let mut cache = SpatialTileCache::new(2);
        cache.insert(1, "old");
        cache.insert(1, "new");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), Some(&"new"));
        assert_eq!(cache.remove(&1), Some("new"));
        assert!(cache.is_empty());
    }
}
