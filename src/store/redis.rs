//! Redis-backed store over a managed connection.
//!
//! Supports both redis:// and rediss:// (TLS) URLs. The connection manager
//! reconnects automatically; `close` performs the explicit shutdown path.

use std::time::Duration;

use anyhow::{Context, Result};
use redis::AsyncCommands;

use super::Store;
use crate::error::WardenResult;

#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    close_timeout: Duration,
}

impl RedisStore {
    /// Connect to the store with a bounded connect timeout.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> Result<Self> {
        let is_tls = url.starts_with("rediss://");
        if is_tls {
            tracing::info!("Redis TLS enabled (rediss://)");
        } else {
            tracing::info!("Redis TLS not enabled (redis://)");
        }

        let client = redis::Client::open(url).context("Failed to parse Redis URL")?;

        tracing::debug!("Getting Redis connection manager...");
        let conn = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Redis connection timed out after {} seconds",
                    connect_timeout.as_secs()
                )
            })?
            .context("Failed to connect to Redis")?;

        Ok(Self {
            conn,
            close_timeout,
        })
    }

    /// Explicit shutdown: try a graceful QUIT under a timeout, and fall
    /// back to dropping the connection if the graceful path fails or hangs.
    pub async fn close(&self) {
        let mut conn = self.conn.clone();
        let quit = async move {
            let result: Result<(), redis::RedisError> =
                redis::cmd("QUIT").query_async(&mut conn).await;
            result
        };
        match tokio::time::timeout(self.close_timeout, quit).await {
            Ok(Ok(())) => tracing::info!("Store connection closed"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Graceful store disconnect failed, dropping connection")
            }
            Err(_) => {
                tracing::warn!("Graceful store disconnect timed out, dropping connection")
            }
        }
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> WardenResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> WardenResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn del_batch(&self, keys: &[String]) -> WardenResult<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key);
        }
        let removed: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(removed.into_iter().map(|n| n > 0).collect())
    }

    async fn incr(&self, key: &str) -> WardenResult<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1).await?)
    }

    async fn pttl(&self, key: &str) -> WardenResult<i64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("PTTL").arg(key).query_async(&mut conn).await?)
    }

    async fn pexpire(&self, key: &str, ttl_ms: i64) -> WardenResult<bool> {
        let mut conn = self.conn.clone();
        let armed: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(armed == 1)
    }

    async fn get_i64(&self, key: &str) -> WardenResult<Option<i64>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> WardenResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> WardenResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> WardenResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.expire(key, ttl_secs).await?)
    }

    async fn mget(&self, keys: &[String]) -> WardenResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        Ok(cmd.query_async(&mut conn).await?)
    }

    async fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> WardenResult<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok((next, keys))
    }

    async fn sadd_and_set(
        &self,
        set_key: &str,
        member: &str,
        kv_key: &str,
        kv_value: &str,
        ttl_secs: u64,
    ) -> WardenResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .sadd(set_key, member)
            .ignore()
            .expire(set_key, ttl_secs as i64)
            .ignore()
            .set_ex(kv_key, kv_value, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> WardenResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
