//! Cache Backend Implementations
//!
//! # Available Backends
//!
//! - **Redis** - durable, networked store shared by every replica (default)
//! - **Memory** - `DashMap` store local to the process
//! - **Noop** - selected when caching is disabled; always misses
//!
//! # Usage
//!
//! ```rust,no_run
//! use anime_catalog_cache::backends::create_backend;
//! use anime_catalog_cache::config::CacheConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let backend = create_backend(&CacheConfig::default()).await?;
//! println!("cache backend: {}", backend.name());
//! # Ok(())
//! # }
//! ```

pub mod memory_cache;
pub mod noop_cache;
#[cfg(feature = "redis")]
pub mod redis_cache;

pub use memory_cache::MemoryCache;
pub use noop_cache::NoopCache;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{BackendKind, CacheConfig};
use crate::traits::CacheBackend;

/// How often the memory backend drops expired entries nobody reads again.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the byte store selected by configuration.
///
/// # Errors
///
/// Returns an error if the Redis backend is selected and the connection
/// cannot be established, or if Redis support was compiled out.
pub async fn create_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
    if !config.enabled {
        info!("Caching disabled, using no-op backend");
        return Ok(Arc::new(NoopCache::new()));
    }

    match config.backend {
        BackendKind::Memory => {
            let cache = MemoryCache::new();
            cache.spawn_cleanup(MEMORY_SWEEP_INTERVAL);
            Ok(Arc::new(cache))
        }
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Arc::new(RedisCache::connect(config).await?)),
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => {
            anyhow::bail!("Redis backend requested but the `redis` feature is disabled")
        }
    }
}
