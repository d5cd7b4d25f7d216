//! Catalog Cache System Builder
//!
//! Assembles a [`CatalogCacheSystem`] from configuration, with optional
//! overrides for the byte store and the database pool.
//!
//! # Example: From Configuration
//!
//! ```rust,no_run
//! use anime_catalog_cache::{CatalogCacheSystemBuilder, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let system = CatalogCacheSystemBuilder::new(Config::from_env()?)
//!         .build()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Custom Backend
//!
//! ```rust,ignore
//! use anime_catalog_cache::{CatalogCacheSystemBuilder, Config, MemoryCache};
//! use std::sync::Arc;
//!
//! let system = CatalogCacheSystemBuilder::new(Config::default())
//!     .with_backend(Arc::new(MemoryCache::new()))
//!     .with_pool(pool)
//!     .build()
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::backends::create_backend;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::json_cache::JsonCacheService;
use crate::storage::{CatalogStore, spawn_pool_gauges};
use crate::telemetry;
use crate::traits::CacheBackend;
use crate::writer::BackgroundWriter;
use crate::CatalogCacheSystem;

/// Builder for [`CatalogCacheSystem`].
///
/// # Default Behavior
///
/// Without overrides the builder:
/// - creates the byte store selected by `cache.backend` (no-op when
///   `cache.enabled` is false)
/// - opens the SQLite pool at `database.url` and applies the schema
/// - exports pool gauges every `database.gauge_interval_secs`
pub struct CatalogCacheSystemBuilder {
    config: Config,
    backend: Option<Arc<dyn CacheBackend>>,
    pool: Option<SqlitePool>,
    pool_gauges: bool,
}

impl CatalogCacheSystemBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            backend: None,
            pool: None,
            pool_gauges: true,
        }
    }

    /// Use `backend` instead of the one selected by configuration.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use an already-open pool. The schema is still applied.
    #[must_use]
    pub fn with_pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Skip the periodic pool gauge export.
    #[must_use]
    pub fn without_pool_gauges(mut self) -> Self {
        self.pool_gauges = false;
        self
    }

    /// Build the system.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the byte store
    /// cannot be reached, or the database cannot be opened or migrated.
    pub async fn build(self) -> Result<CatalogCacheSystem> {
        let config = self.config;
        config.validate().context("Invalid configuration")?;
        telemetry::describe_metrics();
        info!(
            app = %config.app.name,
            environment = %config.app.environment,
            "Building catalog cache system"
        );

        let backend = match self.backend {
            Some(backend) => {
                info!(backend = backend.name(), "Using custom cache backend");
                backend
            }
            None => create_backend(&config.cache).await?,
        };

        let store = match self.pool {
            Some(pool) => {
                let store = CatalogStore::new(pool);
                store.migrate().await.context("Failed to apply schema")?;
                store
            }
            None => CatalogStore::connect(&config.database)
                .await
                .with_context(|| format!("Failed to open database {}", config.database.url))?,
        };

        let gauges = (self.pool_gauges && config.database.gauge_interval_secs > 0).then(|| {
            spawn_pool_gauges(
                store.pool().clone(),
                Duration::from_secs(config.database.gauge_interval_secs),
            )
        });

        let writer = BackgroundWriter::new(config.cache.write_timeout());
        let cache = Arc::new(JsonCacheService::new(
            backend,
            writer,
            config.cache.operation_timeout(),
        ));
        let service = Arc::new(CatalogService::new(store, Arc::clone(&cache), &config.cache));

        info!(
            backend = cache.backend().name(),
            namespace = %config.cache.namespace,
            "Catalog cache system built"
        );
        Ok(CatalogCacheSystem::from_parts(config, service, gauges))
    }
}
