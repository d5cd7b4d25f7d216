//! Cache Backend Traits
//!
//! This module defines the two seams of the cache stack:
//!
//! - `CacheBackend`: byte-level key/value store with mandatory TTLs. The
//!   Redis, in-memory and no-op backends all implement it.
//! - `JsonLayer`: typed JSON access implemented by every layer stacked on
//!   top of a backend (plain JSON, compression, field pruning, child
//!   separation). Callers that do not care which layer they talk to are
//!   generic over it.
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use anime_catalog_cache::{CacheBackend, async_trait};
//! use std::time::Duration;
//! use anyhow::Result;
//!
//! struct MyStore;
//!
//! #[async_trait]
//! impl CacheBackend for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> { todo!() }
//!     async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> { todo!() }
//!     // ...
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::CacheError;
use crate::pruning::CacheEntity;

/// Byte-level cache backend.
///
/// # Failure model
///
/// - Transport failures are errors.
/// - A missing (or expired) key is `Ok(None)` / `Ok(false)`, never an error.
/// - `set_with_ttl` and `set_if_absent` reject a zero TTL.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every in-flight request.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove `key`; `Ok(false)` when there was nothing to remove.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every key matching a glob pattern (`*`, `?`, `[...]`).
    ///
    /// Enumeration and deletion are separate phases: keys created in
    /// between may survive. Returns the number of keys removed; an empty
    /// enumeration is not an error.
    async fn remove_pattern(&self, pattern: &str) -> Result<usize>;

    /// Whether `key` currently exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store `value` only if `key` does not exist.
    ///
    /// Returns `true` when this call created the key. Used as an advisory
    /// lock that releases itself when `ttl` elapses.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Check whether the backend is operational.
    async fn health_check(&self) -> bool;

    /// Release backend resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Name of this backend, for logging.
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Typed JSON access over a byte store.
///
/// Writes are fire-and-forget: `set_json` encodes synchronously and hands
/// the store call to the background writer, so a `get_json` issued right
/// after `set_json` may still miss.
#[async_trait]
pub trait JsonLayer: Send + Sync {
    /// Fetch and decode the value under `key`; `Ok(None)` on a miss.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send;

    /// Encode `value` and schedule its write under `key`.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + CacheEntity + Sync + ?Sized;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Name of this layer, for logging.
    fn name(&self) -> &'static str;
}
