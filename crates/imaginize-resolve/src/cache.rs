use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use imaginize_core::EntityType;
use lru::LruCache;
use serde::{Deserialize, Serialize};

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Key = (newName.lowercased, newType, existingName.lowercased) (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    pub new_name_lower: String,
    pub new_type: EntityType,
    pub existing_name_lower: String,
}

impl ResolveKey {
    pub fn new(new_name: &str, new_type: EntityType, existing_name: &str) -> Self {
        ResolveKey {
            new_name_lower: new_name.to_lowercase(),
            new_type,
            existing_name_lower: existing_name.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveValue {
    pub is_match: bool,
    pub confidence: f32,
    pub reasoning: String,
    pub inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
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

/// LRU+TTL cache for entity-resolution decisions, grounded directly on
/// `ingest::embedding::cache::EmbeddingCache`, extended with a composite
/// tuple key and a TTL check on `get` (spec §4.5).
pub struct ResolutionCache {
    inner: Mutex<LruCache<ResolveKey, ResolveValue>>,
    ttl: Duration,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl ResolutionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        ResolutionCache {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Returns `None` on miss or expiry; an expired entry is evicted and
    /// counted as a miss (spec §4.5).
    pub fn get(&self, key: &ResolveKey) -> Option<ResolveValue> {
        let mut cache = self.inner.lock().unwrap();
        if let Some(value) = cache.get(key) {
            let age = Utc::now().signed_duration_since(value.inserted_at);
            if age.to_std().unwrap_or(Duration::MAX) < self.ttl {
                *self.hits.lock().unwrap() += 1;
                return Some(value.clone());
            }
            cache.pop(key);
        }
        *self.misses.lock().unwrap() += 1;
        None
    }

    pub fn put(&self, key: ResolveKey, is_match: bool, confidence: f32, reasoning: String) {
        let value = ResolveValue {
            is_match,
            confidence,
            reasoning,
            inserted_at: Utc::now(),
        };
        self.inner.lock().unwrap().put(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: *self.hits.lock().unwrap(),
            misses: *self.misses.lock().unwrap(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot for persistence across invocations; order is
    /// least-recently-used to most-recently-used.
    pub fn snapshot(&self) -> Vec<(ResolveKey, ResolveValue)> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn restore(&self, entries: Vec<(ResolveKey, ResolveValue)>) {
        let mut cache = self.inner.lock().unwrap();
        for (key, value) in entries {
            cache.put(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_put_then_hit() {
        let cache = ResolutionCache::new(10, Duration::from_secs(60));
        let key = ResolveKey::new("Jon", EntityType::Character, "Jon Snow");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), true, 0.9, "same person".into());
        let value = cache.get(&key).unwrap();
        assert!(value.is_match);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entry_counts_as_miss_and_is_evicted() {
        let cache = ResolutionCache::new(10, Duration::from_millis(10));
        let key = ResolveKey::new("Jon", EntityType::Character, "Jon Snow");
        cache.put(key.clone(), true, 0.9, "same person".into());
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evicts_least_recently_used_on_overflow() {
        let cache = ResolutionCache::new(2, Duration::from_secs(60));
        let a = ResolveKey::new("a", EntityType::Character, "x");
        let b = ResolveKey::new("b", EntityType::Character, "x");
        let c = ResolveKey::new("c", EntityType::Character, "x");
        cache.put(a.clone(), true, 0.9, "r".into());
        cache.put(b.clone(), true, 0.9, "r".into());
        cache.put(c.clone(), true, 0.9, "r".into());
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn key_is_case_insensitive_on_both_names() {
        let a = ResolveKey::new("JON", EntityType::Character, "jon snow");
        let b = ResolveKey::new("jon", EntityType::Character, "Jon Snow");
        assert_eq!(a, b);
    }
}
