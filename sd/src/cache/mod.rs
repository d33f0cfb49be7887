//! Namespaced response cache with TTL and pluggable backends
//!
//! Keys are content-derived: SHA-256 over a canonical (sorted-keys) JSON
//! serialization of the request parameters, prefixed with a namespace. Two
//! backends honor the same contract: a bounded in-memory LRU and a Redis
//! pass-through. When the external backend is unreachable the cache degrades
//! to a no-op instead of failing callers.

mod memory;
mod redis_backend;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

pub use memory::MemoryBackend;
pub use redis_backend::{RedisBackend, RedisCacheError};

/// Cache namespaces with their default TTLs (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    AuditResult,
    Standards,
    LlmResponse,
    ProjectConfig,
    Statistics,
    Health,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::AuditResult => "audit",
            Namespace::Standards => "standards",
            Namespace::LlmResponse => "llm",
            Namespace::ProjectConfig => "project",
            Namespace::Statistics => "stats",
            Namespace::Health => "health",
        }
    }

    /// Default TTL applied when the caller does not override
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            Namespace::AuditResult => 3600,
            Namespace::Standards => 86_400,
            Namespace::LlmResponse => 7200,
            Namespace::ProjectConfig => 1800,
            Namespace::Statistics => 300,
            Namespace::Health => 30,
        };
        Duration::from_secs(secs)
    }
}

/// Hit/miss/error counters, lock-free
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub total_requests: u64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            errors,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            total_requests: total,
        }
    }
}

/// Derive a namespaced cache key from request parameters
///
/// `extras` participate in the hash; a BTreeMap keeps serialization
/// canonical regardless of caller insertion order.
pub fn cache_key(namespace: Namespace, prompt: &str, model: &str, temperature: f32, extras: &BTreeMap<String, Value>) -> String {
    let mut canonical: BTreeMap<&str, Value> = BTreeMap::new();
    canonical.insert("prompt", Value::String(prompt.to_string()));
    canonical.insert("model", Value::String(model.to_string()));
    canonical.insert(
        "temperature",
        serde_json::Number::from_f64(temperature as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    for (key, value) in extras {
        canonical.insert(key.as_str(), value.clone());
    }

    let serialized = serde_json::to_string(&canonical).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    format!("{}:{:x}", namespace.as_str(), digest)
}

enum Backend {
    Memory(MemoryBackend),
    Redis(RedisBackend),
    /// Degraded mode: every operation is a no-op miss
    Disabled,
}

/// The response cache
pub struct ResponseCache {
    backend: Backend,
    stats: CacheStats,
    default_ttl: Duration,
}

impl ResponseCache {
    /// In-memory cache bounded to `max_size` entries
    pub fn memory(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            backend: Backend::Memory(MemoryBackend::new(max_size)),
            stats: CacheStats::default(),
            default_ttl,
        }
    }

    /// Redis-backed cache; the backend enforces TTLs
    pub fn redis(backend: RedisBackend, default_ttl: Duration) -> Self {
        Self {
            backend: Backend::Redis(backend),
            stats: CacheStats::default(),
            default_ttl,
        }
    }

    /// No-op cache for degraded operation
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            stats: CacheStats::default(),
            default_ttl: Duration::from_secs(0),
        }
    }

    /// Human-readable backend name for health reporting
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
            Backend::Disabled => "disabled",
        }
    }

    /// Look up a cached value; expired entries count as misses
    pub async fn get(&self, key: &str) -> Option<Value> {
        let result = match &self.backend {
            Backend::Memory(backend) => Ok(backend.get(key)),
            Backend::Redis(backend) => backend.get(key).await,
            Backend::Disabled => Ok(None),
        };

        match result {
            Ok(Some(value)) => {
                self.stats.record_hit();
                debug!(key = %short(key), "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.stats.record_miss();
                None
            }
            Err(e) => {
                self.stats.record_error();
                debug!(key = %short(key), error = %e, "cache get failed");
                None
            }
        }
    }

    /// Store a value with an optional TTL override
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let result = match &self.backend {
            Backend::Memory(backend) => {
                backend.set(key, value, ttl);
                Ok(true)
            }
            Backend::Redis(backend) => backend.set(key, value, ttl).await,
            Backend::Disabled => Ok(false),
        };

        match result {
            Ok(stored) => stored,
            Err(e) => {
                self.stats.record_error();
                debug!(key = %short(key), error = %e, "cache set failed");
                false
            }
        }
    }

    /// Remove a key; true when something was deleted
    pub async fn delete(&self, key: &str) -> bool {
        let result = match &self.backend {
            Backend::Memory(backend) => Ok(backend.delete(key)),
            Backend::Redis(backend) => backend.delete(key).await,
            Backend::Disabled => Ok(false),
        };

        result.unwrap_or_else(|e| {
            self.stats.record_error();
            debug!(key = %short(key), error = %e, "cache delete failed");
            false
        })
    }

    /// Drop every key in a namespace; returns the removal count
    pub async fn clear_namespace(&self, namespace: Namespace) -> usize {
        let prefix = format!("{}:", namespace.as_str());
        let result = match &self.backend {
            Backend::Memory(backend) => Ok(backend.clear_prefix(&prefix)),
            Backend::Redis(backend) => backend.clear_prefix(&prefix).await,
            Backend::Disabled => Ok(0),
        };

        result.unwrap_or_else(|e| {
            self.stats.record_error();
            debug!(namespace = namespace.as_str(), error = %e, "cache clear failed");
            0
        })
    }

    /// Backend reachability for health reporting
    pub async fn health_check(&self) -> bool {
        match &self.backend {
            Backend::Memory(_) => true,
            Backend::Redis(backend) => backend.ping().await,
            Backend::Disabled => false,
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Entries currently held (memory backend only)
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Memory(backend) => backend.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(24)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_key_is_deterministic_and_namespaced() {
        let extras = BTreeMap::new();
        let a = cache_key(Namespace::LlmResponse, "prompt", "model", 0.7, &extras);
        let b = cache_key(Namespace::LlmResponse, "prompt", "model", 0.7, &extras);
        let c = cache_key(Namespace::AuditResult, "prompt", "model", 0.7, &extras);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("llm:"));
        assert!(c.starts_with("audit:"));
    }

    #[tokio::test]
    async fn test_key_varies_with_parameters() {
        let extras = BTreeMap::new();
        let a = cache_key(Namespace::LlmResponse, "prompt", "model", 0.7, &extras);
        let b = cache_key(Namespace::LlmResponse, "prompt", "model", 0.2, &extras);
        let c = cache_key(Namespace::LlmResponse, "other", "model", 0.7, &extras);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_memory_roundtrip_and_stats() {
        let cache = ResponseCache::memory(10, Duration::from_secs(60));

        assert!(cache.get("llm:miss").await.is_none());
        assert!(cache.set("llm:key", json!({"v": 1}), None).await);
        assert_eq!(cache.get("llm:key").await, Some(json!({"v": 1})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_removed() {
        let cache = ResponseCache::memory(10, Duration::from_secs(60));
        cache.set("llm:k", json!(1), Some(Duration::from_millis(0))).await;

        assert!(cache.get("llm:k").await.is_none());
        assert_eq!(cache.len(), 0, "expired key removed on read");
    }

    #[tokio::test]
    async fn test_lru_eviction_at_capacity() {
        let cache = ResponseCache::memory(3, Duration::from_secs(60));
        for i in 0..3 {
            cache.set(&format!("llm:k{i}"), json!(i), None).await;
        }
        // Touch k0 so k1 becomes least recently used
        cache.get("llm:k0").await;
        cache.set("llm:k3", json!(3), None).await;

        assert!(cache.len() <= 3);
        assert!(cache.get("llm:k1").await.is_none(), "LRU key evicted");
        assert!(cache.get("llm:k0").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_namespace() {
        let cache = ResponseCache::memory(10, Duration::from_secs(60));
        cache.set("llm:a", json!(1), None).await;
        cache.set("llm:b", json!(2), None).await;
        cache.set("audit:c", json!(3), None).await;

        let removed = cache.clear_namespace(Namespace::LlmResponse).await;
        assert_eq!(removed, 2);
        assert!(cache.get("audit:c").await.is_some());
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = ResponseCache::disabled();
        assert!(!cache.set("llm:k", json!(1), None).await);
        assert!(cache.get("llm:k").await.is_none());
        assert!(!cache.health_check().await);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = ResponseCache::memory(10, Duration::from_secs(60));
        cache.set("llm:k", json!(1), None).await;
        assert!(cache.delete("llm:k").await);
        assert!(!cache.delete("llm:k").await);
    }

    #[test]
    fn test_namespace_ttls() {
        assert_eq!(Namespace::AuditResult.default_ttl().as_secs(), 3600);
        assert_eq!(Namespace::Standards.default_ttl().as_secs(), 86_400);
        assert_eq!(Namespace::LlmResponse.default_ttl().as_secs(), 7200);
        assert_eq!(Namespace::ProjectConfig.default_ttl().as_secs(), 1800);
        assert_eq!(Namespace::Statistics.default_ttl().as_secs(), 300);
        assert_eq!(Namespace::Health.default_ttl().as_secs(), 30);
    }
}
