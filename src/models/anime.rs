use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ANIME_SHAPE, ANIME_WITH_NEXT_EPISODE_SHAPE, AnimeEpisode, Episode};
use crate::airing::AirTimeDisplayInfo;
use crate::pruning::{CacheEntity, EntityShape};

/// Catalog entry.
///
/// Every field has a default because cached copies may have been pruned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anime {
    pub id: String,
    pub title_en: String,
    pub title_jp: String,
    pub title_romaji: String,
    pub title_kanji: String,
    pub title_synonyms: Vec<String>,
    pub synopsis: Option<String>,
    pub image_url: Option<String>,
    /// Stored episode count (`episodes` column).
    pub episode_count: Option<i64>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub genres: Vec<String>,
    /// Free-form, e.g. `"24 min per episode"`.
    pub duration: Option<String>,
    /// Free-form, e.g. `"Wednesdays at 01:29 (JST)"`.
    pub broadcast: Option<String>,
    pub source: Option<String>,
    pub licensors: Vec<String>,
    pub studios: Vec<String>,
    pub rating: Option<String>,
    pub ranking: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub anime_episodes: Vec<AnimeEpisode>,
}

impl Anime {
    /// Sort episodes by episode number.
    pub fn sort_episodes(&mut self) {
        self.anime_episodes.sort_by_key(|episode| episode.episode);
    }

    /// Detach the episode list, leaving it empty.
    pub fn take_episodes(&mut self) -> Vec<AnimeEpisode> {
        std::mem::take(&mut self.anime_episodes)
    }
}

impl CacheEntity for Anime {
    const SHAPE: &'static EntityShape = &ANIME_SHAPE;
}

/// An anime together with its next episode, as returned by airing queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeWithNextEpisode {
    #[serde(flatten)]
    pub anime: Anime,
    pub next_episode: Option<Episode>,
    pub air_time_display: Option<AirTimeDisplayInfo>,
}

impl AnimeWithNextEpisode {
    #[must_use]
    pub fn next_air_time(&self) -> Option<DateTime<Utc>> {
        self.next_episode.as_ref().map(|episode| episode.air_time)
    }
}

impl CacheEntity for AnimeWithNextEpisode {
    const SHAPE: &'static EntityShape = &ANIME_WITH_NEXT_EPISODE_SHAPE;
}
