//! Redis pass-through cache backend
//!
//! TTLs are enforced by the server via SETEX. Connection management is
//! delegated to redis's reconnecting `ConnectionManager`.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Errors from the external cache backend
#[derive(Debug, Error)]
pub enum RedisCacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Redis-backed cache operations
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the given redis URL
    pub async fn connect(url: &str) -> Result<Self, RedisCacheError> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected to redis cache backend");
        Ok(Self { manager })
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, RedisCacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, RedisCacheError> {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(&value)?;
        let () = conn.set_ex(key, raw, ttl.as_secs().max(1)).await?;
        Ok(true)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, RedisCacheError> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    /// Remove every key matching `prefix*`
    pub async fn clear_prefix(&self, prefix: &str) -> Result<usize, RedisCacheError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(format!("{prefix}*")).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: usize = conn.del(&keys).await?;
        Ok(removed)
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok()
    }
}
