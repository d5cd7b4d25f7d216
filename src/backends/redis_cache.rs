//! Redis Cache - Durable Byte Store
//!
//! Networked backend used when caching is enabled. Shares a single
//! `ConnectionManager` (automatic reconnection) across all requests.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CacheConfig;

/// Keys fetched per SCAN round-trip.
const SCAN_BATCH: usize = 100;

/// Redis byte store with `ConnectionManager` for automatic reconnection
///
/// Provides:
/// - Millisecond-precision TTLs (`PSETEX`)
/// - Cursor-based pattern deletion (`SCAN` + `DEL`, never `KEYS`)
/// - `SET NX PX` for advisory locks
pub struct RedisCache {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    /// Hit counter
    hits: Arc<AtomicU64>,
    /// Miss counter
    misses: Arc<AtomicU64>,
    /// Set counter
    sets: Arc<AtomicU64>,
}

impl RedisCache {
    /// Connect using host/port/password/db from the cache configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created, the connection is
    /// not established within the connect timeout, or `PING` fails.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let url = config.redis_url();
        Self::with_url(&url, Duration::from_secs(config.connect_timeout_secs)).await
    }

    /// Connect to an explicit Redis URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or connection fails.
    pub async fn with_url(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let redacted = redact(redis_url);
        info!(redis_url = %redacted, "Initializing Redis cache with ConnectionManager");

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redacted}"))?;

        let conn_manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .with_context(|| format!("Timed out connecting to Redis after {connect_timeout:?}"))?
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redacted, "Redis cache connected");

        Ok(Self {
            conn_manager,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Scan keys matching a glob pattern with cursor-based `SCAN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("SCAN failed for pattern '{pattern}'"))?;

            cursor = next;
            keys.extend(batch);

            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return the same key more than once.
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    /// Remove multiple keys at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn_manager.clone();
        let count: usize = conn.del(keys).await.context("Bulk DEL failed")?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    /// (hits, misses, sets) observed by this backend.
    #[must_use]
    pub fn counters(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
        )
    }
}

fn ttl_millis(key: &str, ttl: Duration) -> Result<u64> {
    if ttl.is_zero() {
        anyhow::bail!("zero TTL rejected for key '{key}'");
    }
    // Sub-millisecond TTLs round up rather than to zero.
    Ok(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

fn redact(url: &str) -> String {
    match (url.split_once("://"), url.rsplit_once('@')) {
        (Some((scheme, rest)), Some((_, host))) if rest.contains('@') => {
            format!("{scheme}://***@{host}")
        }
        _ => url.to_string(),
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("GET failed for key '{key}'"))?;

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let millis = ttl_millis(key, ttl)?;
        let mut conn = self.conn_manager.clone();

        let _: () = conn
            .pset_ex(key, value, millis)
            .await
            .with_context(|| format!("PSETEX failed for key '{key}'"))?;
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = millis, "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let count: usize = conn
            .del(key)
            .await
            .with_context(|| format!("DEL failed for key '{key}'"))?;
        Ok(count > 0)
    }

    async fn remove_pattern(&self, pattern: &str) -> Result<usize> {
        let keys = self.scan_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut removed = 0;
        for chunk in keys.chunks(SCAN_BATCH) {
            removed += self.remove_bulk(chunk).await?;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .with_context(|| format!("EXISTS failed for key '{key}'"))?;
        Ok(exists)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(key, ttl)?;
        let mut conn = self.conn_manager.clone();

        // SET key value NX PX ttl -> "OK" when set, nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("SET NX failed for key '{key}'"))?;

        Ok(reply.is_some())
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    async fn close(&self) -> Result<()> {
        let (hits, misses, sets) = self.counters();
        info!(hits, misses, sets, "Closing Redis cache");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
