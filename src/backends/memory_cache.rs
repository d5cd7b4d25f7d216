//! Memory Cache - In-Process Byte Store
//!
//! A `DashMap`-backed store with per-entry TTLs and Redis-compatible glob
//! deletion. Selected with `cache.backend = "memory"` for single-node
//! deployments and used by the test suite in place of Redis.

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::keys::glob_match;

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

fn sweep_expired(map: &DashMap<String, CacheEntry>) -> usize {
    let mut removed = 0;
    map.retain(|_, entry| {
        if entry.is_expired() {
            removed += 1;
            false
        } else {
            true
        }
    });
    if removed > 0 {
        debug!(count = removed, "[Memory] Cleaned up expired entries");
    }
    removed
}

/// Concurrent in-memory byte store
///
/// **Features**:
/// - Lock-sharded concurrent reads/writes
/// - Lazy TTL expiry on access, plus periodic sweeps via `spawn_cleanup`
/// - Atomic `set_if_absent` through the map's entry API
///
/// **Limitations**:
/// - No size bound and no eviction policy besides TTL
/// - Not shared across processes
#[derive(Clone)]
pub struct MemoryCache {
    map: Arc<DashMap<String, CacheEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing in-memory cache backend");

        Self {
            map: Arc::new(DashMap::new()),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sweep expired entries every `interval` until every clone of this
    /// cache is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let map: Weak<DashMap<String, CacheEntry>> = Arc::downgrade(&self.map);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(map) = map.upgrade() else {
                    debug!("[Memory] Cache dropped, stopping expiry sweeps");
                    return;
                };
                sweep_expired(&map);
            }
        })
    }

    /// Live (unexpired) keys matching a glob pattern, sorted.
    #[must_use]
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .map
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Raw bytes stored under `key`, bypassing hit/miss accounting.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.map
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
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

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Trait Implementations =====

use crate::traits::CacheBackend;
use async_trait::async_trait;

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.map.get(key) {
            if entry.is_expired() {
                drop(entry); // Release read lock
                self.map.remove_if(key, |_, e| e.is_expired());
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            anyhow::bail!("zero TTL rejected for key '{key}'");
        }
        self.map
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_ms = %ttl.as_millis(), "[Memory] Cached key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self
            .map
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn remove_pattern(&self, pattern: &str) -> Result<usize> {
        // Enumerate first, then delete: mirrors SCAN + DEL semantics.
        let keys: Vec<String> = self
            .map
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = keys
            .iter()
            .filter(|key| self.map.remove(key.as_str()).is_some())
            .count();
        debug!(pattern = %pattern, removed, "[Memory] Removed keys matching pattern");
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.map.get(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            anyhow::bail!("zero TTL rejected for key '{key}'");
        }
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CacheEntry::new(value.to_vec(), ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value.to_vec(), ttl));
                Ok(true)
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        let (hits, misses, sets) = self.counters();
        info!(hits, misses, sets, entries = self.len(), "Closing in-memory cache");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
