//! Anime Catalog Cache
//!
//! Read-path core of an anime catalog service:
//! - **Layered JSON cache** over Redis (or an in-process map): gzip
//!   compression above a size threshold, per-entity field pruning, and
//!   separation of large episode collections into their own entries
//! - **Fire-and-forget writes** supervised by a process-wide task tracker
//! - **Pattern invalidation** driven by catalog mutation events
//! - **Season query planner** over SQLite with one entry point and five
//!   physical strategies
//! - **Airing engine** computing next episodes, JST broadcast times and
//!   display badges for the currently-airing list
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use anime_catalog_cache::{AiringRequest, CatalogCacheSystem, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     anime_catalog_cache::telemetry::init_tracing(&config.logging);
//!
//!     let system = CatalogCacheSystem::connect(config).await?;
//!     let catalog = system.catalog();
//!
//!     if let Some(anime) = catalog.anime_by_id("frieren").await? {
//!         tracing::info!(title = %anime.title_en, "Found anime");
//!     }
//!     let airing = catalog
//!         .currently_airing(&AiringRequest::default(), chrono::Utc::now())
//!         .await?;
//!     tracing::info!(count = airing.len(), "Currently airing");
//!
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! CatalogService ─┬─ SeparatedCache ─┐
//!                 ├─ PrunedCache ────┼─ CompressedCache ─ JsonCacheService ─ CacheBackend
//!                 ├─ (season, airing)┘                          │
//!                 │                                      BackgroundWriter
//!                 ├─ SeasonPlanner ─┐
//!                 ├─ airing engine  ├─ CatalogStore (SQLite)
//!                 └─ InvalidationCoordinator
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod airing;
pub mod backends;
pub mod builder;
pub mod catalog;
pub mod compression;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod json_cache;
pub mod jst;
pub mod keys;
pub mod models;
pub mod planner;
pub mod pruning;
pub mod rebuild;
pub mod separation;
pub mod storage;
pub mod telemetry;
pub mod traits;
pub mod writer;

pub use airing::{AirTimeDisplayInfo, AiringRequest, AiringState, AiringWindow, DisplayVariant};
#[cfg(feature = "redis")]
pub use backends::RedisCache;
pub use backends::{MemoryCache, NoopCache};
pub use builder::CatalogCacheSystemBuilder;
pub use catalog::CatalogService;
pub use compression::CompressedCache;
pub use config::{CacheConfig, CacheTtls, Config, DatabaseConfig, LoggingConfig};
pub use error::{CacheError, CatalogError, CatalogResult, ParseError};
pub use invalidation::{
    InvalidationCoordinator, InvalidationEvent, InvalidationReport, InvalidationStats,
    InvalidationTarget,
};
pub use json_cache::{CacheStats, JsonCacheService};
pub use keys::{KeyBuilder, RankedList};
pub use models::{
    Anime, AnimeEpisode, AnimeSeason, AnimeWithNextEpisode, Episode, Season, SeasonKind,
    SeasonStatus, Tag,
};
pub use planner::{FieldSelection, SeasonPlanner, SeasonQuery, Strategy};
pub use pruning::{CacheEntity, EntityKind, EntityShape, FieldPruner, PruneRules, PrunedCache};
pub use rebuild::RebuildCoordinator;
pub use separation::SeparatedCache;
pub use storage::CatalogStore;
pub use traits::{CacheBackend, JsonLayer};
pub use writer::BackgroundWriter;

// Re-export async_trait for custom backends
pub use async_trait::async_trait;

/// Main entry point: the catalog service plus the resources it owns.
///
/// # Example
///
/// ```rust,no_run
/// use anime_catalog_cache::{CatalogCacheSystem, Config};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let system = CatalogCacheSystem::connect(Config::from_env()?).await?;
///     let top = system.catalog().top_rated(10, 0).await?;
///     system.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct CatalogCacheSystem {
    config: Config,
    catalog: Arc<CatalogService>,
    pool_gauges: Option<JoinHandle<()>>,
}

impl CatalogCacheSystem {
    /// Build from configuration with the default backend and pool.
    ///
    /// # Errors
    ///
    /// See [`CatalogCacheSystemBuilder::build`].
    pub async fn connect(config: Config) -> Result<Self> {
        CatalogCacheSystemBuilder::new(config).build().await
    }

    pub(crate) fn from_parts(
        config: Config,
        catalog: Arc<CatalogService>,
        pool_gauges: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            config,
            catalog,
            pool_gauges,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The read service (primary interface).
    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.catalog
    }

    #[must_use]
    pub fn invalidation(&self) -> &InvalidationCoordinator {
        self.catalog.invalidation()
    }

    /// True when both the byte store and the database answer.
    ///
    /// A failing cache does not stop reads, but it is reported here so
    /// readiness checks can tell.
    pub async fn health_check(&self) -> bool {
        let cache_ok = self.catalog.cache().health_check().await;
        let store_ok = self.catalog.store().ping().await;

        if cache_ok && store_ok {
            info!("Catalog cache health check passed");
        } else {
            warn!(cache_ok = %cache_ok, store_ok = %store_ok, "Catalog cache health check failed");
        }
        cache_ok && store_ok
    }

    /// Flush pending cache writes, then close the cache and the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache backend fails to close; the pool is
    /// closed regardless.
    pub async fn shutdown(self) -> Result<()> {
        if let Some(handle) = self.pool_gauges {
            handle.abort();
        }
        let closed = self.catalog.cache().close().await;
        self.catalog.store().close().await;
        info!("Catalog cache system shut down");
        closed.map_err(Into::into)
    }
}
