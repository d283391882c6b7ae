use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{ttl_millis, Cache, Result};

/// Redis-backed cache. `try_acquire` is a single `SET key 1 NX PX ttl`, so it
/// is atomic across every process sharing the server.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`). The connection
    /// manager reconnects on its own after transient failures.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(url = %url, "Connected to redis cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }
}
