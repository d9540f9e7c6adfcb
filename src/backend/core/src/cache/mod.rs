//! Redis-backed counters for request rate limiting.
//!
//! Uses a `ConnectionManager`, which multiplexes one connection and
//! reconnects on failure. Clones share the same connection.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::RedisConfig;
use crate::rbac::stores::{CounterStore, StoreResult};

/// [`CounterStore`] over Redis `GET` / `INCR` / `EXPIRE`.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl RedisCounterStore {
    /// Connect and verify with `PING`.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        let store = Self { conn };
        store.ping().await?;

        info!("Redis counter store connected");
        Ok(store)
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Round-trip a `PING`. Returns the latency.
    pub async fn ping(&self) -> StoreResult<Duration> {
        let start = Instant::now();
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(start.elapsed())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn increment(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let value: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// `INCR` and `EXPIRE` in one `MULTI`/`EXEC` round-trip.
    async fn increment_with_expiry(&self, key: &str, seconds: u64) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}
