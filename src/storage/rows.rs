//! Row decoding
//!
//! Decoding is lenient about projection: a column absent from the result
//! set decodes to its default, so the same decoder serves full rows,
//! curated projections and field-selective queries. Joined episode columns
//! carry an `e_` prefix.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::jst::parse_jst;
use crate::models::{Anime, AnimeEpisode, AnimeSeason, SeasonStatus, Tag};

/// Prefix of episode columns in joined result sets.
pub const EPISODE_PREFIX: &str = "e_";

/// Column value, `None` when NULL or not projected.
pub(crate) fn column<T>(row: &SqliteRow, name: &str) -> Result<Option<T>, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    match row.try_get::<Option<T>, _>(name) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn text(row: &SqliteRow, name: &str) -> Result<String, sqlx::Error> {
    Ok(column::<String>(row, name)?.unwrap_or_default())
}

fn timestamp(row: &SqliteRow, name: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    Ok(column::<String>(row, name)?.as_deref().and_then(parse_jst))
}

fn string_list(row: &SqliteRow, name: &str) -> Result<Vec<String>, sqlx::Error> {
    Ok(column::<String>(row, name)?
        .map(|raw| decode_string_list(&raw))
        .unwrap_or_default())
}

/// Decode a JSON string array column; anything else is an empty list.
#[must_use]
pub fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encode a string list for a JSON text column.
#[must_use]
pub fn encode_string_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub fn anime_from_row(row: &SqliteRow) -> Result<Anime, sqlx::Error> {
    Ok(Anime {
        id: text(row, "id")?,
        title_en: text(row, "title_en")?,
        title_jp: text(row, "title_jp")?,
        title_romaji: text(row, "title_romaji")?,
        title_kanji: text(row, "title_kanji")?,
        title_synonyms: string_list(row, "title_synonyms")?,
        synopsis: column(row, "synopsis")?,
        image_url: column(row, "image_url")?,
        episode_count: column(row, "episodes")?,
        status: column(row, "status")?,
        start_date: timestamp(row, "start_date")?,
        end_date: timestamp(row, "end_date")?,
        genres: string_list(row, "genres")?,
        duration: column(row, "duration")?,
        broadcast: column(row, "broadcast")?,
        source: column(row, "source")?,
        licensors: string_list(row, "licensors")?,
        studios: string_list(row, "studios")?,
        rating: column(row, "rating")?,
        ranking: column(row, "ranking")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        anime_episodes: Vec::new(),
    })
}

/// Decode an episode whose columns are named `<prefix><column>`.
pub fn episode_from_row(row: &SqliteRow, prefix: &str) -> Result<AnimeEpisode, sqlx::Error> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(AnimeEpisode {
        id: text(row, &col("id"))?,
        anime_id: text(row, &col("anime_id"))?,
        episode: column(row, &col("episode"))?.unwrap_or_default(),
        title_en: column(row, &col("title_en"))?,
        title_jp: column(row, &col("title_jp"))?,
        aired: timestamp(row, &col("aired"))?,
        synopsis: column(row, &col("synopsis"))?,
        created_at: timestamp(row, &col("created_at"))?,
        updated_at: timestamp(row, &col("updated_at"))?,
    })
}

/// Joined episode columns, `None` when the outer join found no episode.
pub fn joined_episode(row: &SqliteRow) -> Result<Option<AnimeEpisode>, sqlx::Error> {
    if column::<String>(row, "e_id")?.is_none() {
        return Ok(None);
    }
    episode_from_row(row, EPISODE_PREFIX).map(Some)
}

pub fn season_from_row(row: &SqliteRow) -> Result<AnimeSeason, sqlx::Error> {
    let status = column::<String>(row, "status")?
        .and_then(|raw| raw.parse::<SeasonStatus>().ok())
        .unwrap_or_default();
    Ok(AnimeSeason {
        id: text(row, "id")?,
        season: text(row, "season")?,
        status,
        episode_count: column(row, "episode_count")?,
        notes: column(row, "notes")?,
        anime_id: column(row, "anime_id")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub fn tag_from_row(row: &SqliteRow) -> Result<Tag, sqlx::Error> {
    Ok(Tag {
        id: column(row, "id")?.unwrap_or_default(),
        name: text(row, "name")?,
    })
}
