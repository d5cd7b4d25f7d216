//! Integration tests for cache invalidation
//!
//! Every event must leave no key matching its targets behind.

mod common;

use std::time::Duration;

use anime_catalog_cache::{
    AiringRequest, CacheBackend, InvalidationEvent, InvalidationTarget, KeyBuilder, MemoryCache,
    RankedList, SeasonQuery,
};
use chrono::TimeZone;
use common::*;

const TTL: Duration = Duration::from_secs(300);

/// One key from every family, for anime `X` and a bystander `Y`.
fn every_family(keys: &KeyBuilder) -> Vec<String> {
    let start = chrono::Utc.with_ymd_and_hms(2025, 9, 25, 15, 0, 0).unwrap();
    let end = chrono::Utc.with_ymd_and_hms(2025, 10, 2, 15, 0, 0).unwrap();
    let mut all = Vec::new();
    for id in ["X", "Y"] {
        all.push(keys.anime_by_id(id));
        all.push(keys.anime_detail(id));
        all.push(format!("{}:episodes", keys.anime_detail(id)));
        all.push(keys.episodes_by_anime(id));
        all.push(keys.episode_by_id(&format!("{id}-ep1")));
    }
    all.push(keys.anime_season("SPRING_2024", &[]));
    all.push(keys.anime_season("SPRING_2024", &["titleEn".to_string()]));
    all.push(keys.anime_season_with_episodes("FALL_2023"));
    for list in RankedList::ALL {
        all.push(keys.ranked(list, 10, 0));
    }
    all.push(keys.search("frieren", 10));
    all.push(keys.anime_by_tag("Fantasy", 10));
    all.push(keys.currently_airing(10, start, end, 7));
    all.push("unrelated:key".to_string());
    all
}

async fn seed(backend: &MemoryCache, keys: &[String]) {
    for key in keys {
        backend.set_with_ttl(key, b"{}", TTL).await.unwrap();
    }
}

fn assert_targets_cleared(backend: &MemoryCache, targets: &[InvalidationTarget]) {
    for target in targets {
        match target {
            InvalidationTarget::Key(key) => {
                assert!(backend.peek(key).is_none(), "key {key} survived");
            }
            InvalidationTarget::Pattern(pattern) => {
                let left = backend.keys_matching(pattern);
                assert!(left.is_empty(), "pattern {pattern} left {left:?}");
            }
        }
    }
}

/// Every event clears every key matching its targets
#[tokio::test]
async fn test_invalidation_completeness() {
    let events = [
        InvalidationEvent::anime("X"),
        InvalidationEvent::episodes("X"),
        InvalidationEvent::SeasonsMutated,
        InvalidationEvent::RankedListsStale,
        InvalidationEvent::AllAnime,
        InvalidationEvent::FullFlush,
    ];

    for event in events {
        let t = setup_catalog().await;
        let coordinator = t.catalog.invalidation();
        let keys = every_family(coordinator.keys());
        seed(&t.backend, &keys).await;

        let report = coordinator.handle(&event).await.unwrap();
        let targets = event.targets(coordinator.keys());
        assert_eq!(report.targets, targets.len());
        assert_targets_cleared(&t.backend, &targets);
    }
}

/// Invalidating anime X clears its keys, seasons and all anime keys
#[tokio::test]
async fn test_invalidate_anime_scenario() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();
    seed(&t.backend, &every_family(coordinator.keys())).await;

    coordinator.invalidate_anime("X").await.unwrap();

    for pattern in [
        "anime-api:anime:id:X",
        "anime-api:episodes:anime:X",
        "anime-api:anime:season:*",
        "anime-api:anime:*",
    ] {
        assert!(t.backend.keys_matching(pattern).is_empty(), "{pattern}");
    }
    assert!(t.backend.peek("unrelated:key").is_some());
    assert!(t.backend.peek("anime-api:episodes:anime:Y").is_some());
    assert!(t.backend.peek("anime-api:episode:id:Y-ep1").is_some());
}

/// Episode events leave anime entries alone
#[tokio::test]
async fn test_invalidate_episodes_is_narrow() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();
    seed(&t.backend, &every_family(coordinator.keys())).await;

    coordinator.invalidate_episodes("X").await.unwrap();

    assert!(t.backend.peek("anime-api:episodes:anime:X").is_none());
    assert!(t.backend.peek("anime-api:anime:detail:X:episodes").is_none());
    assert!(t.backend.peek("anime-api:anime:id:X").is_some());
    assert!(t.backend.peek("anime-api:episodes:anime:Y").is_some());
    assert!(t.backend.peek("anime-api:anime:season:SPRING_2024:all").is_some());
}

/// Ranked-list events only touch the ranked namespaces
#[tokio::test]
async fn test_invalidate_ranked_lists() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();
    seed(&t.backend, &every_family(coordinator.keys())).await;

    coordinator.invalidate_ranked_lists().await.unwrap();

    assert!(t.backend.keys_matching("anime-api:anime:top_rated:*").is_empty());
    assert!(t.backend.keys_matching("anime-api:anime:most_popular:*").is_empty());
    assert!(t.backend.keys_matching("anime-api:anime:newest:*").is_empty());
    assert!(t.backend.peek("anime-api:anime:id:X").is_some());
    assert!(t.backend.peek("anime-api:anime:search:frieren:10").is_some());
}

/// Pending background writes land before the deletes run
#[tokio::test]
async fn test_invalidation_waits_for_pending_writes() {
    let t = setup_catalog().await;
    test_data::seed_season(t.store(), "SPRING_2024", 3).await;

    // Reads schedule writes; invalidate without settling first.
    t.catalog.anime_by_id("spring_2024-00").await.unwrap();
    t.catalog
        .anime_by_season(&SeasonQuery::new("SPRING_2024"))
        .await
        .unwrap();
    t.catalog.top_rated(10, 0).await.unwrap();
    t.catalog
        .currently_airing(&AiringRequest::default(), test_data::base_time())
        .await
        .unwrap();

    t.catalog.invalidation().invalidate_all_anime().await.unwrap();
    t.settle().await;

    assert!(t.backend.keys_matching("anime-api:anime:*").is_empty());
    assert!(t.backend.keys_matching("anime-api:airing:*").is_empty());
}

/// Full flush empties the store and counts the event
#[tokio::test]
async fn test_flush_all() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();
    seed(&t.backend, &every_family(coordinator.keys())).await;

    let report = coordinator.flush_all().await.unwrap();
    assert!(report.keys_removed > 0);
    assert!(t.backend.keys_matching("*").is_empty());

    let stats = coordinator.stats();
    assert_eq!(stats.events_processed, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.pattern_passes >= 1);
}

/// A steady stream of new writes does not hold an event up
#[tokio::test]
async fn test_invalidation_completes_under_steady_writes() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();
    seed(&t.backend, &every_family(coordinator.keys())).await;

    let writer = t.catalog.cache().writer().clone();
    let producer = tokio::spawn(async move {
        let mut n = 0_u64;
        loop {
            writer.spawn("set", format!("steady:{n}"), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            });
            n += 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let handled = tokio::time::timeout(
        Duration::from_secs(2),
        coordinator.handle(&InvalidationEvent::FullFlush),
    )
    .await;
    producer.abort();

    let report = handled.expect("event must finish while writes keep arriving").unwrap();
    assert!(report.keys_removed > 0);
    assert!(t.backend.keys_matching("anime-api:*").is_empty());
}

/// Only keys that were present count as removed
#[tokio::test]
async fn test_keys_removed_counts_present_keys_only() {
    let t = setup_catalog().await;
    let coordinator = t.catalog.invalidation();

    let report = coordinator.invalidate_episodes("missing").await.unwrap();
    assert_eq!(report.keys_removed, 0);
    assert_eq!(coordinator.stats().errors, 0);

    let present = coordinator.keys().episodes_by_anime("X");
    seed(&t.backend, &[present.clone()]).await;
    let report = coordinator.invalidate_episodes("X").await.unwrap();
    assert_eq!(report.keys_removed, 1);
    assert!(t.backend.peek(&present).is_none());
}
