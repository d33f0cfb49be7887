//! Bounded in-memory cache backend with LRU eviction and per-entry expiry

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-memory backend; non-suspending, guarded by a single lock
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryBackend {
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).expect("max(1) is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a live value; an expired entry is removed and reads as a miss
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        let expired = match entries.get(key) {
            Some(entry) if Instant::now() >= entry.expires_at => true,
            Some(entry) => return Some(entry.value.clone()),
            None => return None,
        };

        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert a value; the least-recently-used entry is evicted when full
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.push(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.pop(key).is_some()
    }

    /// Remove every key with the given prefix
    pub fn clear_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let keys: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            entries.pop(key);
        }
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}
