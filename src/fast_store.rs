//! A fast shared key/value store backed by Redis, used wherever the spec
//! calls for state that must be visible across every process in the fleet
//! without going through Postgres: cancellation flags (spec.md §4.6, §9)
//! and single-use stream tokens (spec.md §4.8, §6).
//!
//! Grounded in the retrieval pack's Redis-backed distributed scheduling
//! example (`harborgrid-justin-caddy/scheduler.rs`), which reaches for
//! `redis::aio::ConnectionManager` for the same reason: a lightweight,
//! auto-reconnecting async handle shared across tasks.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

#[derive(Clone)]
pub struct FastStore {
    conn: ConnectionManager,
}

impl FastStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    pub async fn set_flag(&self, key: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, "1", ttl.as_secs().max(1)).await?;
        Ok(())
    }

    pub async fn is_flagged(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    pub async fn clear_flag(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    /// Atomically reads and deletes a key — the building block for
    /// single-use tokens (spec.md §4.8 "validated and atomically
    /// consumed").
    pub async fn take_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}
