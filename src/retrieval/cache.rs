//! Process-wide embedding cache: bounded LRU with a promotable per-entry
//! TTL.
//!
//! Grounded in the pack's hand-rolled `HashMap`-plus-manual-eviction style
//! rather than an external LRU crate — the teacher favors small bounded
//! structures it owns outright over a dependency for this scope. Keyed by
//! normalized query text; concurrency-safe via a single `Mutex` (reads and
//! writes are both cheap — a handful of hash-map and deque operations —
//! so a single lock is not a contention concern at this cache's size).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    embedding: Vec<f32>,
    inserted_at: Instant,
    ttl: Duration,
    hits: u32,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Most-recently-used key at the back.
    order: VecDeque<String>,
}

/// A bounded, TTL-aware embedding cache.
pub struct EmbeddingCache {
    capacity: usize,
    default_ttl: Duration,
    promoted_ttl: Duration,
    promotion_hits: u32,
    inner: Mutex<Inner>,
}

impl EmbeddingCache {
    /// Creates a cache holding up to `capacity` entries, each expiring
    /// after `default_ttl` unless it accumulates `promotion_hits` hits,
    /// after which its TTL is reset and extended to `promoted_ttl`.
    #[must_use]
    pub fn new(
        capacity: usize,
        default_ttl: Duration,
        promoted_ttl: Duration,
        promotion_hits: u32,
    ) -> Self {
        Self {
            capacity,
            default_ttl,
            promoted_ttl,
            promotion_hits,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Normalizes a query to a stable cache key: trimmed and lowercased.
    #[must_use]
    pub fn normalize_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Looks up `key`, evicting it first if it has expired. On a live hit,
    /// promotes the entry's TTL once it crosses `promotion_hits`.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let expired = inner
            .entries
            .get(key)
            .is_some_and(|entry| now.duration_since(entry.inserted_at) > entry.ttl);
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        let result = inner.entries.get_mut(key).map(|entry| {
            entry.hits += 1;
            if entry.hits >= self.promotion_hits && entry.ttl < self.promoted_ttl {
                entry.ttl = self.promoted_ttl;
                entry.inserted_at = now;
            }
            entry.embedding.clone()
        });

        if result.is_some() {
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.to_string());
        }

        result
    }

    /// Inserts `embedding` under `key`, evicting the least-recently-used
    /// entry if the cache is at capacity.
    #[allow(clippy::unwrap_used)]
    pub fn insert(&self, key: String, embedding: Vec<f32>) {
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(lru_key) = inner.order.pop_front() {
                inner.entries.remove(&lru_key);
            }
        }

        inner.entries.insert(
            key.clone(),
            Entry {
                embedding,
                inserted_at: Instant::now(),
                ttl: self.default_ttl,
                hits: 0,
            },
        );
        inner.order.push_back(key);
    }

    /// Removes every expired entry. Intended to be called periodically
    /// rather than relying solely on lazy eviction during reads.
    #[allow(clippy::unwrap_used)]
    pub fn evict_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let expired_keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) > entry.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired_keys {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
        }
    }

    /// Current number of live entries (including not-yet-lazily-evicted
    /// expired ones).
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60), Duration::from_secs(3600), 3);
        cache.insert("hello".to_string(), vec![1.0, 2.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(1), Duration::from_secs(60), 3);
        cache.insert("hello".to_string(), vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("hello"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_eviction_drops_least_recently_used() {
        let cache = EmbeddingCache::new(2, Duration::from_secs(60), Duration::from_secs(3600), 3);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("b".to_string(), vec![2.0]);
        cache.get("a");
        cache.insert("c".to_string(), vec![3.0]);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(vec![1.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }

    #[test]
    fn normalize_key_trims_and_lowercases() {
        assert_eq!(EmbeddingCache::normalize_key("  Hello World  "), "hello world");
    }
}
