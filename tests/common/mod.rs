//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - In-memory cache backend and SQLite catalog setup
//! - Catalog fixture generators
//! - Wait helpers for background writes

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anime_catalog_cache::config::BackendKind;
use anime_catalog_cache::{
    BackgroundWriter, CacheBackend, CacheConfig, CatalogService, CatalogStore, CompressedCache,
    JsonCacheService, MemoryCache,
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Create a test key with a unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Cache settings for tests: memory backend, generous deadlines.
pub fn memory_config() -> CacheConfig {
    CacheConfig {
        backend: BackendKind::Memory,
        write_timeout_ms: 1_000,
        operation_timeout_ms: 1_000,
        ..CacheConfig::default()
    }
}

/// JSON cache service over `backend`.
pub fn json_service(backend: Arc<dyn CacheBackend>) -> Arc<JsonCacheService> {
    Arc::new(JsonCacheService::new(
        backend,
        BackgroundWriter::new(Duration::from_secs(1)),
        Duration::from_secs(1),
    ))
}

/// Compression layer with the default threshold over a fresh memory backend.
pub fn compressed_stack() -> (Arc<MemoryCache>, Arc<CompressedCache>) {
    let backend = Arc::new(MemoryCache::new());
    let service = json_service(backend.clone());
    (backend, Arc::new(CompressedCache::with_default_threshold(service)))
}

/// Single-connection in-memory database with the schema applied.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    anime_catalog_cache::storage::migrate(&pool)
        .await
        .expect("Failed to apply schema");
    pool
}

pub async fn memory_store() -> CatalogStore {
    CatalogStore::new(memory_pool().await)
}

/// Catalog service over a memory backend and an in-memory database.
pub struct TestCatalog {
    pub backend: Arc<MemoryCache>,
    pub catalog: CatalogService,
}

impl TestCatalog {
    pub fn store(&self) -> &CatalogStore {
        self.catalog.store()
    }

    /// Wait for every scheduled cache write.
    pub async fn settle(&self) {
        self.catalog.cache().quiesce().await;
    }
}

pub async fn setup_catalog() -> TestCatalog {
    setup_catalog_with(memory_config()).await
}

pub async fn setup_catalog_with(config: CacheConfig) -> TestCatalog {
    let backend = Arc::new(MemoryCache::new());
    let cache = json_service(backend.clone());
    let catalog = CatalogService::new(memory_store().await, cache, &config);
    TestCatalog { backend, catalog }
}

/// Catalog fixtures
pub mod test_data {
    use anime_catalog_cache::jst::parse_jst;
    use anime_catalog_cache::{Anime, AnimeEpisode, AnimeSeason, CatalogStore, SeasonStatus};
    use chrono::{DateTime, Duration, Utc};

    /// Fixed instant with second precision, so it survives storage.
    pub fn base_time() -> DateTime<Utc> {
        parse_jst("2024-04-01 09:00:00").expect("valid fixture time")
    }

    /// Fully populated anime, including every field the cache layers prune.
    pub fn anime(id: &str, title: &str, ranking: Option<i64>) -> Anime {
        Anime {
            id: id.to_string(),
            title_en: title.to_string(),
            title_jp: format!("{title} (JP)"),
            title_romaji: format!("{title} romaji"),
            title_kanji: String::new(),
            title_synonyms: vec![format!("{title} alt")],
            synopsis: Some(format!("Synopsis of {title}. ").repeat(20)),
            image_url: Some(format!("https://img.example/{id}.jpg")),
            episode_count: Some(12),
            status: Some("Currently Airing".to_string()),
            start_date: Some(base_time()),
            end_date: None,
            genres: vec!["Action".to_string(), "Fantasy".to_string()],
            duration: Some("24 min per episode".to_string()),
            broadcast: Some("Fridays at 23:00 (JST)".to_string()),
            source: Some("Manga".to_string()),
            licensors: vec!["Licensor".to_string()],
            studios: vec!["Studio".to_string()],
            rating: Some("PG-13".to_string()),
            ranking,
            created_at: Some(base_time()),
            updated_at: Some(base_time()),
            anime_episodes: Vec::new(),
        }
    }

    pub fn episode(anime_id: &str, number: i64, aired: DateTime<Utc>) -> AnimeEpisode {
        AnimeEpisode {
            id: format!("{anime_id}-ep{number}"),
            anime_id: anime_id.to_string(),
            episode: number,
            title_en: Some(format!("Episode {number}")),
            title_jp: Some(format!("第{number}話")),
            aired: Some(aired),
            synopsis: Some(format!("Episode {number} synopsis")),
            created_at: Some(base_time()),
            updated_at: Some(base_time()),
        }
    }

    pub fn season_row(anime_id: &str, season: &str) -> AnimeSeason {
        AnimeSeason {
            id: format!("{season}-{anime_id}"),
            season: season.to_string(),
            status: SeasonStatus::Confirmed,
            episode_count: Some(12),
            notes: None,
            anime_id: Some(anime_id.to_string()),
            created_at: Some(base_time()),
            updated_at: Some(base_time()),
        }
    }

    /// Insert an anime with `episodes` weekly episodes, inserted in reverse
    /// order so readers must sort them.
    pub async fn insert_anime(store: &CatalogStore, anime: &Anime, episodes: i64) {
        store.upsert_anime(anime).await.expect("insert anime");
        for number in (1..=episodes).rev() {
            let aired = base_time() + Duration::weeks(number - 1);
            store
                .upsert_episode(&episode(&anime.id, number, aired))
                .await
                .expect("insert episode");
        }
    }

    /// Seed `count` anime into `season`; returns their ids.
    ///
    /// Rankings descend with the index so storage order and ranking order
    /// differ. Every third anime has no episodes.
    pub async fn seed_season(store: &CatalogStore, season: &str, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = format!("{}-{i:02}", season.to_lowercase());
            let ranking = i64::try_from(count - i).ok();
            let entry = anime(&id, &format!("Title {i:02}"), ranking);
            let episodes = if i % 3 == 2 { 0 } else { 3 };
            insert_anime(store, &entry, episodes).await;
            store
                .upsert_season(&season_row(&id, season))
                .await
                .expect("insert season");
            ids.push(id);
        }
        ids
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    use tokio::time::{Duration, sleep};

    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }

    false
}
