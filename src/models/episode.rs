use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ANIME_EPISODE_SHAPE, EPISODE_SHAPE};
use crate::pruning::{CacheEntity, EntityShape};

/// Episode row as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeEpisode {
    pub id: String,
    pub anime_id: String,
    /// Episode number; episodes of one anime are ordered by it.
    pub episode: i64,
    pub title_en: Option<String>,
    pub title_jp: Option<String>,
    pub aired: Option<DateTime<Utc>>,
    pub synopsis: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CacheEntity for AnimeEpisode {
    const SHAPE: &'static EntityShape = &ANIME_EPISODE_SHAPE;
}

/// Episode as exposed by airing queries, with its computed air time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub id: String,
    pub anime_id: String,
    pub episode_number: i64,
    pub title_en: Option<String>,
    pub title_jp: Option<String>,
    pub aired: Option<DateTime<Utc>>,
    /// Air time derived from `aired` and the anime's broadcast slot (UTC).
    pub air_time: DateTime<Utc>,
    pub synopsis: Option<String>,
}

impl Episode {
    #[must_use]
    pub fn from_row(row: &AnimeEpisode, air_time: DateTime<Utc>) -> Self {
        Self {
            id: row.id.clone(),
            anime_id: row.anime_id.clone(),
            episode_number: row.episode,
            title_en: row.title_en.clone(),
            title_jp: row.title_jp.clone(),
            aired: row.aired,
            air_time,
            synopsis: row.synopsis.clone(),
        }
    }
}

impl CacheEntity for Episode {
    const SHAPE: &'static EntityShape = &EPISODE_SHAPE;
}
