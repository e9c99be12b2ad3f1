use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

use super::repository::{GenerationLock, LockToken};
use crate::metrics::{track_cache_operation, GENERATION_LOCK_CONTENTION_TOTAL};

const LOCK_PREFIX: &str = "papergen:generation";

pub fn lock_key(blueprint_id: &str) -> String {
    format!("{}:{}", LOCK_PREFIX, blueprint_id)
}

/// Per-blueprint mutual exclusion for generation requests, backed by Redis.
pub struct RedisGenerationLock {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisGenerationLock {
    pub fn new(redis: ConnectionManager, ttl: Duration) -> Self {
        Self { redis, ttl }
    }
}

#[async_trait]
impl GenerationLock for RedisGenerationLock {
    async fn try_acquire(&self, blueprint_id: &str) -> Result<Option<LockToken>> {
        let key = lock_key(blueprint_id);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();
        let ttl_ms = self.ttl.as_millis() as u64;

        let acquired: Option<String> = track_cache_operation("lock_acquire", async {
            redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .context("Failed to acquire generation lock")
        })
        .await?;

        if acquired.is_none() {
            GENERATION_LOCK_CONTENTION_TOTAL.inc();
            tracing::warn!(blueprint = %blueprint_id, "Generation already in progress");
            return Ok(None);
        }

        Ok(Some(LockToken { key, token }))
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        // Only the holder may delete; an expired lock may already belong to someone else.
        let lua_script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
        "#;

        let mut conn = self.redis.clone();
        let _: i64 = track_cache_operation("lock_release", async {
            redis::Script::new(lua_script)
                .key(&token.key)
                .arg(&token.token)
                .invoke_async(&mut conn)
                .await
                .context("Failed to release generation lock")
        })
        .await?;

        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        tokio::time::timeout(
            Duration::from_millis(500),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis timeout after 500ms"))?
        .context("Redis error")?;
        Ok(())
    }
}

/// Used when no Redis is configured: every acquire succeeds.
pub struct NoopGenerationLock;

#[async_trait]
impl GenerationLock for NoopGenerationLock {
    async fn try_acquire(&self, blueprint_id: &str) -> Result<Option<LockToken>> {
        Ok(Some(LockToken {
            key: lock_key(blueprint_id),
            token: String::new(),
        }))
    }

    async fn release(&self, _token: &LockToken) -> Result<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
