//! Per-client response cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Keyed cache whose entries expire after a fixed time-to-live.
///
/// Owned by a client instance; nothing is shared between instances.
#[derive(Debug)]
pub struct TimedCache<K, V> {
    /// Entry lifetime.
    ttl: Duration,
    /// Cached values with the instant they were stored.
    entries: HashMap<K, (V, Instant)>,
}

impl<K: Eq + Hash, V: Clone> TimedCache<K, V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns a fresh value, if any.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Stores a value.
    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        self.entries.get(key).and_then(|(value, stored)| {
            (now.saturating_duration_since(*stored) < self.ttl).then(|| value.clone())
        })
    }

    fn insert_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.retain(|_, (_, stored)| now.saturating_duration_since(*stored) < self.ttl);
        self.entries.insert(key, (value, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_entry() {
        let mut cache = TimedCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_expired_entry() {
        let mut cache = TimedCache::new(Duration::from_secs(60));
        let start = Instant::now();
        cache.insert_at("a", 1, start);
        assert_eq!(cache.get_at(&"a", start + Duration::from_secs(30)), Some(1));
        assert_eq!(cache.get_at(&"a", start + Duration::from_secs(61)), None);
    }

    #[test]
    fn test_instances_are_isolated() {
        let mut first = TimedCache::new(Duration::from_secs(60));
        let second: TimedCache<&str, i32> = TimedCache::new(Duration::from_secs(60));
        first.insert("a", 1);
        assert_eq!(second.get(&"a"), None);

        first.clear();
        assert!(first.is_empty());
    }
}
