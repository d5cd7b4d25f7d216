//! Physical plans for season queries
//!
//! All strategies return the same set of anime for a season. They differ
//! in projection width, joins and round trips:
//!
//! | Strategy | Round trips | Episodes |
//! |---|---|---|
//! | `JoinAll` | 1, full projection, ordered join | populated |
//! | `OptimizedProjection` | 1, curated projection, unordered join | populated, sorted in memory |
//! | `AnimeOnly` | 1, no episode join | empty |
//! | `Batched` | 3: ids, anime by ids, episodes by ids | populated |
//! | `FieldSelective` | 1, projection from a `FieldSelection` | empty |

use std::collections::{HashMap, HashSet};

use sqlx::sqlite::SqliteRow;

use super::fields::FieldSelection;
use crate::models::{Anime, AnimeEpisode};
use crate::storage::rows::{anime_from_row, joined_episode};
use crate::storage::{ANIME_COLUMNS, CatalogStore, prefixed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Legacy single join projecting every column; kept for parity checks.
    JoinAll,
    OptimizedProjection,
    AnimeOnly,
    Batched,
    FieldSelective,
}

impl Strategy {
    pub const ALL: [Self; 5] = [
        Self::JoinAll,
        Self::OptimizedProjection,
        Self::AnimeOnly,
        Self::Batched,
        Self::FieldSelective,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::JoinAll => "join_all",
            Self::OptimizedProjection => "optimized_projection",
            Self::AnimeOnly => "anime_only",
            Self::Batched => "batched",
            Self::FieldSelective => "field_selective",
        }
    }

    /// Whether results carry episodes.
    #[must_use]
    pub fn populates_episodes(self) -> bool {
        matches!(self, Self::JoinAll | Self::OptimizedProjection | Self::Batched)
    }
}

const EPISODE_JOIN_COLUMNS: &str = "e.id AS e_id, e.anime_id AS e_anime_id, e.episode AS e_episode, \
     e.title_en AS e_title_en, e.title_jp AS e_title_jp, e.aired AS e_aired, \
     e.synopsis AS e_synopsis, e.created_at AS e_created_at, e.updated_at AS e_updated_at";

const CURATED_COLUMNS: &str = "a.id, a.title_en, a.title_jp, a.title_romaji, a.image_url, \
     a.episodes, a.status, a.start_date, a.end_date, a.duration, a.broadcast, a.rating, \
     a.ranking, a.created_at, a.updated_at, \
     e.id AS e_id, e.anime_id AS e_anime_id, e.episode AS e_episode, \
     e.title_en AS e_title_en, e.aired AS e_aired";

const SEASON_MEMBERS: &str =
    "a.id IN (SELECT anime_id FROM anime_seasons WHERE season = ? AND anime_id IS NOT NULL)";

pub(super) async fn join_all(store: &CatalogStore, season: &str) -> Result<Vec<Anime>, sqlx::Error> {
    let sql = format!(
        "SELECT {anime}, {EPISODE_JOIN_COLUMNS} \
         FROM anime_seasons s \
         JOIN anime a ON a.id = s.anime_id \
         LEFT JOIN episodes e ON e.anime_id = a.id \
         WHERE s.season = ? \
         ORDER BY a.id ASC, e.episode ASC",
        anime = prefixed("a", ANIME_COLUMNS),
    );
    let rows = sqlx::query(&sql).bind(season).fetch_all(store.pool()).await?;
    group_joined_rows(&rows)
}

pub(super) async fn optimized_projection(
    store: &CatalogStore,
    season: &str,
) -> Result<Vec<Anime>, sqlx::Error> {
    let sql = format!(
        "SELECT {CURATED_COLUMNS} \
         FROM anime a \
         LEFT JOIN episodes e ON e.anime_id = a.id \
         WHERE {SEASON_MEMBERS}"
    );
    let rows = sqlx::query(&sql).bind(season).fetch_all(store.pool()).await?;
    let mut anime = group_joined_rows(&rows)?;
    for entry in &mut anime {
        entry.sort_episodes();
    }
    Ok(anime)
}

pub(super) async fn anime_only(store: &CatalogStore, season: &str) -> Result<Vec<Anime>, sqlx::Error> {
    let sql = format!(
        "SELECT {anime} FROM anime a WHERE {SEASON_MEMBERS}",
        anime = prefixed("a", ANIME_COLUMNS),
    );
    let rows = sqlx::query(&sql).bind(season).fetch_all(store.pool()).await?;
    rows.iter().map(anime_from_row).collect()
}

pub(super) async fn batched(store: &CatalogStore, season: &str) -> Result<Vec<Anime>, sqlx::Error> {
    let ids = store.anime_ids_for_season(season).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut anime = store.anime_by_ids(&ids).await?;
    let episodes = store.episodes_by_anime_ids(&ids).await?;

    let mut by_anime: HashMap<String, Vec<AnimeEpisode>> = HashMap::new();
    for episode in episodes {
        by_anime.entry(episode.anime_id.clone()).or_default().push(episode);
    }
    for entry in &mut anime {
        entry.anime_episodes = by_anime.remove(&entry.id).unwrap_or_default();
    }
    Ok(anime)
}

/// Ordered by `ranking ASC, title_en ASC` in SQL.
pub(super) async fn field_selective(
    store: &CatalogStore,
    season: &str,
    fields: &FieldSelection,
) -> Result<Vec<Anime>, sqlx::Error> {
    let sql = format!(
        "SELECT {columns} FROM anime a WHERE {SEASON_MEMBERS} \
         ORDER BY a.ranking ASC, a.title_en ASC",
        columns = fields.build_select_clause("a"),
    );
    let rows = sqlx::query(&sql).bind(season).fetch_all(store.pool()).await?;
    rows.iter().map(anime_from_row).collect()
}

/// Fold anime-episode join rows into anime, keeping first-seen order and
/// dropping duplicate episodes.
fn group_joined_rows(rows: &[SqliteRow]) -> Result<Vec<Anime>, sqlx::Error> {
    let mut anime: Vec<Anime> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen_episodes: HashSet<String> = HashSet::new();

    for row in rows {
        let parent = anime_from_row(row)?;
        let slot = match index.get(&parent.id) {
            Some(slot) => *slot,
            None => {
                index.insert(parent.id.clone(), anime.len());
                anime.push(parent);
                anime.len() - 1
            }
        };

        let Some(episode) = joined_episode(row)? else {
            continue;
        };
        if !seen_episodes.insert(episode.id.clone()) {
            continue;
        }
        if let Some(entry) = anime.get_mut(slot) {
            entry.anime_episodes.push(episode);
        }
    }
    Ok(anime)
}
