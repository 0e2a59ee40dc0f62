//! Key-value store boundary: Redis in deployment, an in-memory map in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::info;

/// Durable cache substrate with per-item TTLs and a lock primitive
/// sufficient for cross-process single-flight.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;

    /// Try to take the named lock. Returns true when this caller now holds
    /// it. The TTL is a safety net so a crashed holder cannot wedge the
    /// key forever.
    async fn acquire(&self, lock_key: &str, ttl: Duration) -> Result<bool>;

    /// Drop the named lock.
    async fn release(&self, lock_key: &str) -> Result<()>;
}

// ── Redis ─────────────────────────────────────────────────────────────

/// Redis-backed store using a shared multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the backend responds.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::CacheBackend(format!("invalid Redis URL: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::CacheBackend(format!("Redis connection failed: {e}")))?;
        let mut conn = manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::CacheBackend(format!("Redis PING failed: {e}")))?;
        if pong != "PONG" {
            return Err(Error::CacheBackend(format!(
                "Redis PING returned unexpected response: {pong}"
            )));
        }
        info!("Connected to Redis at {url}");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| Error::CacheBackend(format!("GET {key}: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| Error::CacheBackend(format!("SETEX {key}: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| Error::CacheBackend(format!("DEL {key}: {e}")))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::CacheBackend(format!("FLUSHDB: {e}")))?;
        Ok(())
    }

    async fn acquire(&self, lock_key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let acquired: bool = conn
            .set_nx(lock_key, "locked")
            .await
            .map_err(|e| Error::CacheBackend(format!("SETNX {lock_key}: {e}")))?;
        if acquired {
            let _: () = conn
                .expire(lock_key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(|e| Error::CacheBackend(format!("EXPIRE {lock_key}: {e}")))?;
        }
        Ok(acquired)
    }

    async fn release(&self, lock_key: &str) -> Result<()> {
        self.delete(lock_key).await
    }
}

// ── In-memory mock ────────────────────────────────────────────────────

/// In-process store honoring TTLs. Backs tests and offline runs; shares
/// the exact trait surface Redis provides.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, (String, Instant)>>,
    locks: Arc<DashMap<String, Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if *expires_at > Instant::now() {
                    return Ok(Some(value.clone()));
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.locks.clear();
        Ok(())
    }

    async fn acquire(&self, lock_key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.locks.entry(lock_key.to_string()) {
            Entry::Occupied(mut held) => {
                if *held.get() > now {
                    Ok(false)
                } else {
                    held.insert(now + ttl);
                    Ok(true)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, lock_key: &str) -> Result<()> {
        self.locks.remove(lock_key);
        Ok(())
    }
}
