//! Transparent gzip compression layer
//!
//! Payloads whose serialized size reaches the threshold are gzip-compressed
//! before they are stored. Reads sniff the gzip magic bytes, so compressed
//! and raw entries (including ones written by the plain JSON layer) decode
//! the same way.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::json_cache::JsonCacheService;
use crate::pruning::CacheEntity;
use crate::telemetry;
use crate::traits::JsonLayer;

/// Leading bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Payloads of at least this many bytes are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

#[must_use]
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Turn serialized JSON into the bytes kept at rest.
///
/// # Errors
///
/// Returns `Compression` if the gzip encoder fails.
pub fn encode_payload(json: Vec<u8>, threshold: usize) -> Result<Vec<u8>, CacheError> {
    if json.len() < threshold {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Undo [`encode_payload`]; raw JSON is returned as is.
///
/// # Errors
///
/// Returns `Compression` for a truncated or corrupt gzip stream.
pub fn decode_payload(bytes: Vec<u8>) -> Result<Vec<u8>, CacheError> {
    if !is_compressed(&bytes) {
        return Ok(bytes);
    }
    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// JSON layer that gzip-compresses large payloads.
pub struct CompressedCache {
    inner: Arc<JsonCacheService>,
    threshold: usize,
}

impl CompressedCache {
    #[must_use]
    pub fn new(inner: Arc<JsonCacheService>, threshold: usize) -> Self {
        Self { inner, threshold }
    }

    #[must_use]
    pub fn with_default_threshold(inner: Arc<JsonCacheService>) -> Self {
        Self::new(inner, DEFAULT_COMPRESSION_THRESHOLD)
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn service(&self) -> &Arc<JsonCacheService> {
        &self.inner
    }
}

#[async_trait]
impl JsonLayer for CompressedCache {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        let start = Instant::now();
        let Some(stored) = self.inner.get_bytes(key).await? else {
            return Ok(None);
        };
        telemetry::record_phase("storage", start.elapsed());

        let compressed = is_compressed(&stored);
        let start = Instant::now();
        let json = match decode_payload(stored) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt compressed cache entry");
                self.inner.note_decode_error(key);
                return Err(e);
            }
        };
        if compressed {
            telemetry::record_phase("decompress", start.elapsed());
        }

        let start = Instant::now();
        let value = self.inner.decode(key, &json)?;
        telemetry::record_phase("decode", start.elapsed());
        Ok(Some(value))
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + CacheEntity + Sync + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        let original = json.len();
        let stored = encode_payload(json, self.threshold)?;
        telemetry::record_payload_sizes(original, stored.len());
        debug!(
            key = %key,
            original_bytes = original,
            stored_bytes = stored.len(),
            compressed = is_compressed(&stored),
            "Caching payload"
        );
        self.inner.set_bytes(key, stored, ttl)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        self.inner.delete_pattern(pattern).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    fn name(&self) -> &'static str {
        "compressed"
    }
}
