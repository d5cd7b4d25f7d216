//! Integration tests for the catalog read service
//!
//! Read-through caching, stampede control and cache-failure fallback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anime_catalog_cache::keys::lock_key;
use anime_catalog_cache::{
    Anime, CacheBackend, CatalogCacheSystemBuilder, CatalogService, Config, JsonCacheService,
    MemoryCache, RankedList, async_trait,
};
use anyhow::Result;
use common::*;
use futures_util::future::join_all;

/// Byte store whose every call fails.
struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        anyhow::bail!("connection refused")
    }
    async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        anyhow::bail!("connection refused")
    }
    async fn remove(&self, _key: &str) -> Result<bool> {
        anyhow::bail!("connection refused")
    }
    async fn remove_pattern(&self, _pattern: &str) -> Result<usize> {
        anyhow::bail!("connection refused")
    }
    async fn exists(&self, _key: &str) -> Result<bool> {
        anyhow::bail!("connection refused")
    }
    async fn set_if_absent(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool> {
        anyhow::bail!("connection refused")
    }
    async fn health_check(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "Broken"
    }
}

/// Miss, storage fetch, background write, then a pruned hit
#[tokio::test]
async fn test_anime_by_id_read_through() {
    let t = setup_catalog().await;
    let anime = test_data::anime("a1", "Frieren", Some(1));
    test_data::insert_anime(t.store(), &anime, 0).await;
    let key = t.catalog.keys().anime_by_id("a1");

    let first = t.catalog.anime_by_id("a1").await.unwrap().unwrap();
    assert_eq!(first, anime);
    assert!(wait_for(|| t.backend.peek(&key).is_some(), 200).await);

    let hits_before = t.catalog.cache().stats().hits;
    let second = t.catalog.anime_by_id("a1").await.unwrap().unwrap();
    assert!(t.catalog.cache().stats().hits > hits_before);

    assert_eq!(second.id, "a1");
    assert_eq!(second.title_en, "Frieren");
    assert!(second.synopsis.is_none());
    assert!(second.genres.is_empty());
    assert!(second.licensors.is_empty());
    assert!(second.title_synonyms.is_empty());
    assert!(second.broadcast.is_none());
    assert_eq!(second.studios, anime.studios);
}

/// Missing rows are returned as `None` and never cached
#[tokio::test]
async fn test_missing_anime_is_not_cached() {
    let t = setup_catalog().await;
    assert!(t.catalog.anime_by_id("nope").await.unwrap().is_none());
    t.settle().await;
    assert!(t.backend.peek(&t.catalog.keys().anime_by_id("nope")).is_none());
    assert!(t.backend.peek(&lock_key(&t.catalog.keys().anime_by_id("nope"))).is_none());
}

/// Parent and separated episodes are cached and reassembled in order
#[tokio::test]
async fn test_anime_with_episodes_round_trip() {
    let t = setup_catalog().await;
    let anime = test_data::anime("a1", "Frieren", Some(1));
    test_data::insert_anime(t.store(), &anime, 4).await;
    let key = t.catalog.keys().anime_detail("a1");

    let first = t.catalog.anime_with_episodes("a1").await.unwrap().unwrap();
    let numbers: Vec<i64> = first.anime_episodes.iter().map(|e| e.episode).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    t.settle().await;
    assert!(t.backend.peek(&key).is_some());
    assert!(t.backend.peek(&format!("{key}:episodes")).is_some());

    let second = t.catalog.anime_with_episodes("a1").await.unwrap().unwrap();
    let numbers: Vec<i64> = second.anime_episodes.iter().map(|e| e.episode).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert!(second.source.is_none());
    assert!(second.anime_episodes.iter().all(|e| e.title_jp.is_none()));
}

/// A cached parent whose episodes expired is rebuilt from storage
#[tokio::test]
async fn test_anime_with_episodes_missing_children_rebuilds() {
    let t = setup_catalog().await;
    test_data::insert_anime(t.store(), &test_data::anime("a1", "Frieren", Some(1)), 2).await;
    let key = t.catalog.keys().anime_detail("a1");

    t.catalog.anime_with_episodes("a1").await.unwrap();
    t.settle().await;
    t.backend.remove(&format!("{key}:episodes")).await.unwrap();

    let rebuilt = t.catalog.anime_with_episodes("a1").await.unwrap().unwrap();
    assert_eq!(rebuilt.anime_episodes.len(), 2);
    assert!(rebuilt.anime_episodes.iter().all(|e| e.title_jp.is_some()));
}

/// Episode reads use the episode key families
#[tokio::test]
async fn test_episode_reads() {
    let t = setup_catalog().await;
    test_data::insert_anime(t.store(), &test_data::anime("a1", "Frieren", Some(1)), 3).await;

    let episodes = t.catalog.episodes_by_anime("a1").await.unwrap();
    assert_eq!(episodes.len(), 3);
    assert_eq!(episodes.first().map(|e| e.episode), Some(1));

    let episode = t.catalog.episode_by_id("a1-ep2").await.unwrap().unwrap();
    assert_eq!(episode.episode, 2);

    t.settle().await;
    assert!(t.backend.peek(&t.catalog.keys().episodes_by_anime("a1")).is_some());
    assert!(t.backend.peek(&t.catalog.keys().episode_by_id("a1-ep2")).is_some());

    let cached = t.catalog.episodes_by_anime("a1").await.unwrap();
    assert_eq!(cached.len(), 3);
    assert!(cached.iter().all(|e| e.synopsis.is_none()));
}

/// Ranked lists are cached per list, limit and offset
#[tokio::test]
async fn test_ranked_lists() {
    let t = setup_catalog().await;
    for (i, ranking) in [(0, Some(3)), (1, Some(1)), (2, None), (3, Some(2))] {
        let anime = test_data::anime(&format!("a{i}"), &format!("Title {i}"), ranking);
        test_data::insert_anime(t.store(), &anime, 0).await;
    }

    let top: Vec<String> = t
        .catalog
        .top_rated(10, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(top, vec!["a1", "a3", "a0"]);

    let page: Vec<String> = t
        .catalog
        .top_rated(1, 1)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(page, vec!["a3"]);

    assert_eq!(t.catalog.most_popular(10, 0).await.unwrap().len(), 4);
    assert_eq!(t.catalog.newest(2, 0).await.unwrap().len(), 2);

    t.settle().await;
    let keys = t.catalog.keys();
    for list in RankedList::ALL {
        assert!(!t.backend.keys_matching(&keys.ranked_pattern(list)).is_empty());
    }
    assert!(t.backend.peek(&keys.ranked(RankedList::TopRated, 1, 1)).is_some());
}

/// Search and tag lookups
#[tokio::test]
async fn test_search_and_tags() {
    let t = setup_catalog().await;
    let store = t.store();
    test_data::insert_anime(store, &test_data::anime("a1", "Frieren", Some(1)), 0).await;
    test_data::insert_anime(store, &test_data::anime("a2", "Dungeon Meshi", Some(2)), 0).await;
    test_data::insert_anime(store, &test_data::anime("a3", "100% Perfect", Some(3)), 0).await;

    let found = t.catalog.search("frier", 10).await.unwrap();
    assert_eq!(found.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a1"]);

    // `%` is matched literally.
    let literal = t.catalog.search("100%", 10).await.unwrap();
    assert_eq!(literal.len(), 1);
    assert!(t.catalog.search("   ", 10).await.unwrap().is_empty());

    let tag = store.ensure_tag("Fantasy").await.unwrap();
    store.tag_anime("a1", tag.id).await.unwrap();
    store.tag_anime("a2", tag.id).await.unwrap();
    let tagged = t.catalog.anime_by_tag("Fantasy", 10).await.unwrap();
    assert_eq!(tagged.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a1", "a2"]);
    assert!(t.catalog.anime_by_tag("Horror", 10).await.unwrap().is_empty());

    t.settle().await;
    assert!(t.backend.peek(&t.catalog.keys().search("frier", 10)).is_some());
    assert!(t.backend.peek(&t.catalog.keys().anime_by_tag("Fantasy", 10)).is_some());
}

/// Concurrent misses for one key are coalesced and agree
#[tokio::test]
async fn test_concurrent_misses_coalesce() {
    let t = setup_catalog().await;
    test_data::insert_anime(t.store(), &test_data::anime("a1", "Frieren", Some(1)), 0).await;
    let catalog = Arc::new(t.catalog);

    let results = join_all((0..20).map(|_| {
        let catalog = Arc::clone(&catalog);
        async move { catalog.anime_by_id("a1").await }
    }))
    .await;

    for result in results {
        assert_eq!(result.unwrap().map(|a| a.id), Some("a1".to_string()));
    }
    assert_eq!(catalog.rebuilds_in_flight(), 0);
    catalog.cache().quiesce().await;
    assert!(t.backend.peek("anime-api:anime:id:a1").is_some());
    assert!(t.backend.peek("anime-api:anime:id:a1:lock").is_none());
}

/// A rebuild lock held by another process suppresses the cache write
#[tokio::test]
async fn test_foreign_lock_serves_without_caching() {
    let t = setup_catalog().await;
    test_data::insert_anime(t.store(), &test_data::anime("a1", "Frieren", Some(1)), 0).await;
    let key = t.catalog.keys().anime_by_id("a1");
    t.backend
        .set_with_ttl(&lock_key(&key), b"other-process", Duration::from_secs(30))
        .await
        .unwrap();

    let anime = t.catalog.anime_by_id("a1").await.unwrap();
    assert!(anime.is_some());
    t.settle().await;
    assert!(t.backend.peek(&key).is_none());
    assert_eq!(t.backend.peek(&lock_key(&key)), Some(b"other-process".to_vec()));
}

/// Without the rebuild lock the entry is written directly
#[tokio::test]
async fn test_rebuild_lock_disabled() {
    let mut config = memory_config();
    config.use_rebuild_lock = false;
    let t = setup_catalog_with(config).await;
    test_data::insert_anime(t.store(), &test_data::anime("a1", "Frieren", Some(1)), 0).await;

    t.catalog.anime_by_id("a1").await.unwrap();
    t.settle().await;
    let key = t.catalog.keys().anime_by_id("a1");
    assert!(t.backend.peek(&key).is_some());
    assert!(t.backend.peek(&lock_key(&key)).is_none());
}

/// A failing byte store never fails a read
#[tokio::test]
async fn test_cache_failure_falls_back_to_storage() {
    let cache = json_service(Arc::new(BrokenBackend));
    let catalog = CatalogService::new(memory_store().await, cache, &memory_config());
    test_data::insert_anime(catalog.store(), &test_data::anime("a1", "Frieren", Some(1)), 2).await;

    let anime: Anime = catalog.anime_by_id("a1").await.unwrap().unwrap();
    assert_eq!(anime.title_en, "Frieren");
    let detail = catalog.anime_with_episodes("a1").await.unwrap().unwrap();
    assert_eq!(detail.anime_episodes.len(), 2);
    assert_eq!(catalog.top_rated(5, 0).await.unwrap().len(), 1);

    catalog.cache().quiesce().await;
    assert!(catalog.cache().stats().errors > 0);
}

/// Storage failures surface
#[tokio::test]
async fn test_storage_failure_surfaces() {
    let t = setup_catalog().await;
    t.store().close().await;
    assert!(t.catalog.anime_by_id("a1").await.is_err());
    assert_eq!(t.catalog.rebuilds_in_flight(), 0);
}

/// Disabled caching still serves reads through the no-op backend
#[tokio::test]
async fn test_disabled_cache_serves_reads() {
    let mut config = memory_config();
    config.enabled = false;
    let backend = anime_catalog_cache::backends::create_backend(&config).await.unwrap();
    assert_eq!(backend.name(), "Noop");
    let cache: Arc<JsonCacheService> = json_service(backend);
    let catalog = CatalogService::new(memory_store().await, cache, &config);
    test_data::insert_anime(catalog.store(), &test_data::anime("a1", "Frieren", Some(1)), 0).await;

    assert!(catalog.anime_by_id("a1").await.unwrap().is_some());
    assert!(catalog.anime_by_id("a1").await.unwrap().is_some());
    assert_eq!(catalog.cache().stats().hits, 0);
}

/// The assembled system serves reads, reports health and shuts down
#[tokio::test]
async fn test_system_builder_end_to_end() {
    let backend = Arc::new(MemoryCache::new());
    let config = Config {
        cache: memory_config(),
        ..Config::default()
    };
    let system = CatalogCacheSystemBuilder::new(config)
        .with_backend(backend.clone())
        .with_pool(memory_pool().await)
        .without_pool_gauges()
        .build()
        .await
        .unwrap();

    let catalog = system.catalog();
    test_data::insert_anime(catalog.store(), &test_data::anime("a1", "Frieren", Some(1)), 1).await;
    assert!(catalog.anime_by_id("a1").await.unwrap().is_some());
    catalog.cache().quiesce().await;
    assert!(backend.peek("anime-api:anime:id:a1").is_some());

    assert!(system.health_check().await);
    system.invalidation().invalidate_anime("a1").await.unwrap();
    assert!(backend.peek("anime-api:anime:id:a1").is_none());

    system.shutdown().await.unwrap();
}

/// Invalid configuration is rejected before anything is opened
#[tokio::test]
async fn test_system_builder_rejects_invalid_config() {
    let mut config = Config {
        cache: memory_config(),
        ..Config::default()
    };
    config.cache.namespace = String::new();
    let result = CatalogCacheSystemBuilder::new(config)
        .with_backend(Arc::new(MemoryCache::new()))
        .build()
        .await;
    assert!(result.is_err());
}
