//! Error types
//!
//! Byte-store backends speak `anyhow::Result`; everything above them
//! (the JSON cache layers and the catalog service) uses the typed errors
//! defined here so callers can tell a decode failure from a transport
//! failure and decide whether to fall back to storage.

use thiserror::Error;

/// Errors surfaced by the JSON cache layers.
///
/// A missing key is not represented here: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The byte store round-trip failed (connection, command, protocol).
    #[error("cache transport error: {0:#}")]
    Transport(anyhow::Error),

    /// Bytes were present but did not decode into the requested shape.
    #[error("failed to decode cached value for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be encoded to JSON.
    #[error("failed to encode value for caching: {0}")]
    Encode(#[from] serde_json::Error),

    /// Gzip compression or decompression failed.
    #[error("cache payload compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// A foreground cache operation exceeded its deadline.
    #[error("cache operation '{operation}' timed out for key '{key}'")]
    Timeout { operation: &'static str, key: String },

    /// Entries are never persisted without a TTL.
    #[error("refusing to cache key '{key}' with a zero TTL")]
    InvalidTtl { key: String },
}

impl CacheError {
    /// Outcome label used for metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "unmarshal_error",
            _ => "error",
        }
    }
}

/// Recoverable parse failures.
///
/// Season parse errors fail the request; broadcast and duration parse
/// errors are absorbed by the airing engine, which falls back to the raw
/// `aired` timestamp and a 24 minute episode length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid season '{0}', expected <SPRING|SUMMER|FALL|WINTER>_<YYYY>")]
    Season(String),

    #[error("unparseable broadcast '{0}'")]
    Broadcast(String),

    #[error("unparseable duration '{0}'")]
    Duration(String),

    #[error("invalid season status '{0}'")]
    SeasonStatus(String),
}

/// Errors surfaced by the catalog read service and the query planner.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An internal contract was broken (for example a field selection that
    /// maps to no columns).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
