//! Integration tests for the season query planner

mod common;

use anime_catalog_cache::{Anime, CatalogError, FieldSelection, SeasonQuery, Strategy};
use common::*;

const SEASON: &str = "SPRING_2024";

fn ids(anime: &[Anime]) -> Vec<&str> {
    anime.iter().map(|a| a.id.as_str()).collect()
}

fn assert_episodes_sorted(anime: &[Anime]) {
    for entry in anime {
        let numbers: Vec<i64> = entry.anime_episodes.iter().map(|e| e.episode).collect();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        assert_eq!(numbers, sorted, "episodes of {} out of order", entry.id);
    }
}

/// Every strategy returns the same anime, in ranking order
#[tokio::test]
async fn test_strategies_agree_on_membership() {
    let t = setup_catalog().await;
    let seeded = test_data::seed_season(t.store(), SEASON, 7).await;
    test_data::seed_season(t.store(), "FALL_2023", 2).await;

    // A duplicate assignment must not duplicate the anime.
    let mut duplicate = test_data::season_row(&seeded[0], SEASON);
    duplicate.id = format!("{}-again", duplicate.id);
    t.store().upsert_season(&duplicate).await.unwrap();

    // Ranking descends with the seed index, so the expected order is reversed.
    let expected: Vec<&str> = seeded.iter().rev().map(String::as_str).collect();
    let fields = FieldSelection::new(["titleEn", "ranking"]);

    for strategy in Strategy::ALL {
        let anime = t
            .catalog
            .planner()
            .execute(strategy, SEASON, Some(&fields))
            .await
            .unwrap();
        assert_eq!(ids(&anime), expected, "strategy {}", strategy.name());

        if strategy.populates_episodes() {
            assert_episodes_sorted(&anime);
            let total: usize = anime.iter().map(|a| a.anime_episodes.len()).sum();
            assert_eq!(total, 5 * 3, "strategy {}", strategy.name());
        } else {
            assert!(anime.iter().all(|a| a.anime_episodes.is_empty()));
        }
    }
}

/// Anime-only leaves episodes empty, batched fills them in order
#[tokio::test]
async fn test_anime_only_and_batched() {
    let t = setup_catalog().await;
    let seeded = test_data::seed_season(t.store(), SEASON, 3).await;

    let planner = t.catalog.planner();
    let lean = planner.find_by_season(&SeasonQuery::new(SEASON)).await.unwrap();
    assert_eq!(lean.len(), 3);
    assert!(lean.iter().all(|a| a.anime_episodes.is_empty()));

    let full = planner
        .find_by_season(&SeasonQuery::new(SEASON).with_episodes(true))
        .await
        .unwrap();
    assert_eq!(full.len(), 3);
    assert_episodes_sorted(&full);
    for entry in &full {
        // The third seeded anime has no episodes.
        let expected = if entry.id == seeded[2] { 0 } else { 3 };
        assert_eq!(entry.anime_episodes.len(), expected, "{}", entry.id);
    }
}

/// Field-selective projections only carry identity and requested columns
#[tokio::test]
async fn test_field_selective_projection() {
    let t = setup_catalog().await;
    test_data::seed_season(t.store(), SEASON, 2).await;

    let query = SeasonQuery::new(SEASON).with_fields(FieldSelection::new(["titleEn", "description"]));
    assert_eq!(query.strategy(), Strategy::FieldSelective);

    let anime = t.catalog.planner().find_by_season(&query).await.unwrap();
    assert_eq!(anime.len(), 2);
    for entry in &anime {
        assert!(!entry.id.is_empty());
        assert!(entry.created_at.is_some());
        assert!(entry.title_en.starts_with("Title"));
        assert!(entry.synopsis.is_some());
        assert!(entry.title_jp.is_empty());
        assert!(entry.broadcast.is_none());
        assert!(entry.genres.is_empty());
    }
}

/// A selection that maps to no columns falls back to a full projection
#[tokio::test]
async fn test_unknown_fields_fall_back_to_full_projection() {
    let t = setup_catalog().await;
    test_data::seed_season(t.store(), SEASON, 1).await;

    let fields = FieldSelection::new(["notAField"]);
    let anime = t
        .catalog
        .planner()
        .execute(Strategy::FieldSelective, SEASON, Some(&fields))
        .await
        .unwrap();
    assert_eq!(anime.len(), 1);
    assert!(!anime[0].title_jp.is_empty());
}

/// Malformed seasons fail before reaching storage or the cache
#[tokio::test]
async fn test_malformed_season_is_rejected() {
    let t = setup_catalog().await;
    test_data::seed_season(t.store(), SEASON, 1).await;

    for season in ["spring_2024", "SPRING-2024", "SPRING_24", ""] {
        let planned = t.catalog.planner().find_by_season(&SeasonQuery::new(season)).await;
        assert!(matches!(planned, Err(CatalogError::Parse(_))), "{season:?}");

        let served = t.catalog.anime_by_season(&SeasonQuery::new(season)).await;
        assert!(matches!(served, Err(CatalogError::Parse(_))), "{season:?}");
    }
    t.settle().await;
    assert!(t.backend.keys_matching("*").is_empty());
}

/// Unknown seasons are an empty result, and the empty list is cached
#[tokio::test]
async fn test_empty_season_is_cached() {
    let t = setup_catalog().await;

    let anime = t.catalog.anime_by_season(&SeasonQuery::new("WINTER_1999")).await.unwrap();
    assert!(anime.is_empty());
    t.settle().await;
    assert!(t.backend.peek("anime-api:anime:season:WINTER_1999:all").is_some());
}

/// Each query shape is cached under its own season bucket
#[tokio::test]
async fn test_season_buckets() {
    let t = setup_catalog().await;
    test_data::seed_season(t.store(), SEASON, 4).await;

    let all = t.catalog.anime_by_season(&SeasonQuery::new(SEASON)).await.unwrap();
    let narrow = t
        .catalog
        .anime_by_season(&SeasonQuery::new(SEASON).with_fields(FieldSelection::new(["titleEn"])))
        .await
        .unwrap();
    let detailed = t
        .catalog
        .anime_by_season(&SeasonQuery::new(SEASON).with_episodes(true))
        .await
        .unwrap();
    t.settle().await;

    assert_eq!(ids(&all), ids(&narrow));
    assert_eq!(ids(&all), ids(&detailed));

    let mut buckets = t.backend.keys_matching("anime-api:anime:season:SPRING_2024:*");
    buckets.sort();
    assert_eq!(
        buckets,
        vec![
            "anime-api:anime:season:SPRING_2024:all",
            "anime-api:anime:season:SPRING_2024:episodes",
            "anime-api:anime:season:SPRING_2024:fields:titleEn",
        ]
    );

    // A second read is served from the bucket, not the database.
    t.store().pool().close().await;
    let cached = t
        .catalog
        .anime_by_season(&SeasonQuery::new(SEASON).with_episodes(true))
        .await
        .unwrap();
    assert_eq!(cached, detailed);
}
