//! Redis-backed key-value store
//!
//! Lets several front-end processes share one persisted session and dataset
//! by pointing them at the same Redis instance.

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::error::StorageResult;
use crate::storage::KeyValueStore;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

/// Redis store
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// Initialize a new Redis store
    pub async fn new(config: &RedisConfig) -> StorageResult<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisStore { client })
    }

    /// Get a connection
    async fn get_connection(&self) -> StorageResult<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> StorageResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_get_delete() -> StorageResult<()> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let store = RedisStore::new(&RedisConfig { url }).await?;
        assert!(store.health_check().await?);

        let key = "balanciago_test_key";
        store.set(key, "test_value").await?;
        assert_eq!(store.get(key).await?, Some("test_value".to_string()));

        store.delete(key).await?;
        assert_eq!(store.get(key).await?, None);
        Ok(())
    }
}
