//! JSON Cache Service
//!
//! Typed JSON access over a [`CacheBackend`]. Reads are awaited and bounded
//! by the operation timeout; writes are encoded synchronously and stored by
//! the [`BackgroundWriter`], so the caller never waits on the byte store.
//!
//! Every call records its duration and outcome (`hit`, `miss`, `error`,
//! `unmarshal_error` for reads; `success`, `error` for writes and deletes).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::pruning::CacheEntity;
use crate::telemetry;
use crate::traits::{CacheBackend, JsonLayer};
use crate::writer::BackgroundWriter;

/// Snapshot of cache service statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub decode_errors: u64,
    pub writes_scheduled: u64,
    pub deletes: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    decode_errors: AtomicU64,
    writes_scheduled: AtomicU64,
    deletes: AtomicU64,
}

/// JSON codec and metrics over a byte store.
pub struct JsonCacheService {
    backend: Arc<dyn CacheBackend>,
    writer: BackgroundWriter,
    op_timeout: Duration,
    stats: AtomicCacheStats,
}

impl JsonCacheService {
    pub fn new(backend: Arc<dyn CacheBackend>, writer: BackgroundWriter, op_timeout: Duration) -> Self {
        debug!(backend = backend.name(), op_timeout_ms = %op_timeout.as_millis(), "Initializing JSON cache service");
        Self {
            backend,
            writer,
            op_timeout,
            stats: AtomicCacheStats::default(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    #[must_use]
    pub fn writer(&self) -> &BackgroundWriter {
        &self.writer
    }

    async fn timed<T, F>(&self, operation: &'static str, key: &str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Transport(e)),
            Err(_) => Err(CacheError::Timeout {
                operation,
                key: key.to_string(),
            }),
        }
    }

    /// Raw bytes under `key`; `Ok(None)` on a miss.
    ///
    /// # Errors
    ///
    /// Returns `Transport` or `Timeout` when the byte store fails.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let start = Instant::now();
        let result = self.timed("get", key, self.backend.get(key)).await;
        let outcome = match &result {
            Ok(Some(_)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                "hit"
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                "miss"
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache get failed");
                "error"
            }
        };
        telemetry::record_cache_op("get", outcome, start.elapsed());
        result
    }

    /// Decode `bytes` read from `key`, evicting the key when it is corrupt.
    pub(crate) fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|source| {
            self.note_decode_error(key);
            CacheError::Decode {
                key: key.to_string(),
                source,
            }
        })
    }

    /// Count a decode failure and delete the offending key in the background.
    pub(crate) fn note_decode_error(&self, key: &str) {
        self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
        telemetry::record_cache_op("get", "unmarshal_error", Duration::ZERO);
        warn!(key = %key, "Cached value is not valid JSON for the requested type, evicting");
        self.evict_in_background(key);
    }

    /// Schedule deletion of `key` without waiting for it.
    pub fn evict_in_background(&self, key: &str) {
        let backend = Arc::clone(&self.backend);
        let owned = key.to_string();
        self.writer.spawn("evict", key.to_string(), async move {
            backend.remove(&owned).await.map(|_| ())
        });
    }

    /// Schedule a write of `bytes` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTtl` for a zero TTL; store failures happen later and
    /// are only logged.
    pub fn set_bytes(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl { key: key.to_string() });
        }
        self.stats.writes_scheduled.fetch_add(1, Ordering::Relaxed);

        let backend = Arc::clone(&self.backend);
        let owned = key.to_string();
        self.writer.spawn("set", key.to_string(), async move {
            let start = Instant::now();
            let result = backend.set_with_ttl(&owned, &bytes, ttl).await;
            let outcome = if result.is_ok() { "success" } else { "error" };
            telemetry::record_cache_op("set", outcome, start.elapsed());
            result
        });
        Ok(())
    }

    /// Atomically create `key` if absent; awaited, because the caller needs
    /// to know whether it holds the lock.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTtl`, `Transport` or `Timeout`.
    pub async fn set_if_absent(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl { key: key.to_string() });
        }
        let start = Instant::now();
        let result = self
            .timed("set_if_absent", key, self.backend.set_if_absent(key, bytes, ttl))
            .await;
        telemetry::record_cache_op("set_if_absent", outcome_of(&result), start.elapsed());
        result
    }

    /// Delete `key`, reporting whether anything was there.
    ///
    /// # Errors
    ///
    /// Returns `Transport` or `Timeout` when the byte store fails.
    pub async fn remove_key(&self, key: &str) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.timed("delete", key, self.backend.remove(key)).await;
        if let Ok(true) = result {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        telemetry::record_cache_op("delete", outcome_of(&result), start.elapsed());
        result
    }

    /// Wait for the writes scheduled so far to land.
    pub async fn quiesce(&self) {
        self.writer.quiesce().await;
    }

    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Flush pending writes and close the backend.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the backend fails to close.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.quiesce().await;
        self.backend.close().await.map_err(CacheError::Transport)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            errors: self.stats.errors.load(Ordering::Relaxed),
            decode_errors: self.stats.decode_errors.load(Ordering::Relaxed),
            writes_scheduled: self.stats.writes_scheduled.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

fn outcome_of<T>(result: &Result<T, CacheError>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[async_trait]
impl JsonLayer for JsonCacheService {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_bytes(key).await? {
            Some(bytes) => self.decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + CacheEntity + Sync + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.set_bytes(key, bytes, ttl)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove_key(key).await.map(|_| ())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let start = Instant::now();
        // Pattern deletion scans the keyspace; it gets the write deadline
        // rather than the tighter per-operation one.
        let result = match tokio::time::timeout(self.writer.timeout().max(self.op_timeout), self.backend.remove_pattern(pattern)).await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(e)) => Err(CacheError::Transport(e)),
            Err(_) => Err(CacheError::Timeout {
                operation: "delete_pattern",
                key: pattern.to_string(),
            }),
        };
        if let Ok(count) = &result {
            self.stats.deletes.fetch_add(*count as u64, Ordering::Relaxed);
            debug!(pattern = %pattern, removed = count, "Deleted keys by pattern");
        }
        telemetry::record_cache_op("delete_pattern", outcome_of(&result), start.elapsed());
        result
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let start = Instant::now();
        let result = self.timed("exists", key, self.backend.exists(key)).await;
        telemetry::record_cache_op("exists", outcome_of(&result), start.elapsed());
        result
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
