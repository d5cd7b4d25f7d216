use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use super::pool::connect_pool;
use super::rows::{
    anime_from_row, encode_string_list, episode_from_row, season_from_row, tag_from_row,
};
use super::schema::migrate;
use crate::config::DatabaseConfig;
use crate::jst::format_jst;
use crate::models::{Anime, AnimeEpisode, AnimeSeason, Tag};

/// Upper bound on bound parameters per `IN (...)` list.
pub const IN_CHUNK_SIZE: usize = 500;

pub(crate) const ANIME_COLUMNS: &str = "id, title_en, title_jp, title_romaji, title_kanji, title_synonyms, \
     synopsis, image_url, episodes, status, start_date, end_date, genres, duration, broadcast, \
     source, licensors, studios, rating, ranking, created_at, updated_at";

pub(crate) const EPISODE_COLUMNS: &str =
    "id, anime_id, episode, title_en, title_jp, aired, synopsis, created_at, updated_at";

/// Relational catalog: anime, episodes, seasons and tags.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using `config` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be opened or the schema fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let store = Self::new(connect_pool(config).await?);
        store.migrate().await?;
        Ok(store)
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        migrate(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ===== Writes =====

    pub async fn upsert_anime(&self, anime: &Anime) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO anime ({ANIME_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&anime.id)
        .bind(&anime.title_en)
        .bind(&anime.title_jp)
        .bind(&anime.title_romaji)
        .bind(&anime.title_kanji)
        .bind(encode_string_list(&anime.title_synonyms))
        .bind(&anime.synopsis)
        .bind(&anime.image_url)
        .bind(anime.episode_count)
        .bind(&anime.status)
        .bind(anime.start_date.map(format_jst))
        .bind(anime.end_date.map(format_jst))
        .bind(encode_string_list(&anime.genres))
        .bind(&anime.duration)
        .bind(&anime.broadcast)
        .bind(&anime.source)
        .bind(encode_string_list(&anime.licensors))
        .bind(encode_string_list(&anime.studios))
        .bind(&anime.rating)
        .bind(anime.ranking)
        .bind(anime.created_at.map(format_jst))
        .bind(anime.updated_at.map(format_jst))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_episode(&self, episode: &AnimeEpisode) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO episodes ({EPISODE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&episode.id)
        .bind(&episode.anime_id)
        .bind(episode.episode)
        .bind(&episode.title_en)
        .bind(&episode.title_jp)
        .bind(episode.aired.map(format_jst))
        .bind(&episode.synopsis)
        .bind(episode.created_at.map(format_jst))
        .bind(episode.updated_at.map(format_jst))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_season(&self, season: &AnimeSeason) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO anime_seasons \
             (id, anime_id, season, status, episode_count, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&season.id)
        .bind(&season.anime_id)
        .bind(&season.season)
        .bind(season.status.as_str())
        .bind(season.episode_count)
        .bind(&season.notes)
        .bind(season.created_at.map(format_jst))
        .bind(season.updated_at.map(format_jst))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Tag id for `name`, creating the tag if needed.
    pub async fn ensure_tag(&self, name: &str) -> Result<Tag, sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        tag_from_row(&row)
    }

    pub async fn tag_anime(&self, anime_id: &str, tag_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO anime_tags (anime_id, tag_id) VALUES (?, ?)")
            .bind(anime_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Reads =====

    pub async fn anime_by_id(&self, id: &str) -> Result<Option<Anime>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {ANIME_COLUMNS} FROM anime WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(anime_from_row).transpose()
    }

    /// Anime with its episodes in episode order.
    pub async fn anime_with_episodes(&self, id: &str) -> Result<Option<Anime>, sqlx::Error> {
        let Some(mut anime) = self.anime_by_id(id).await? else {
            return Ok(None);
        };
        anime.anime_episodes = self.episodes_by_anime(id).await?;
        Ok(Some(anime))
    }

    pub async fn episodes_by_anime(&self, anime_id: &str) -> Result<Vec<AnimeEpisode>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes WHERE anime_id = ? ORDER BY episode ASC"
        ))
        .bind(anime_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| episode_from_row(row, "")).collect()
    }

    pub async fn episode_by_id(&self, id: &str) -> Result<Option<AnimeEpisode>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(|row| episode_from_row(row, "")).transpose()
    }

    /// Best ranking first; unranked anime are excluded.
    pub async fn top_rated(&self, limit: u32, offset: u32) -> Result<Vec<Anime>, sqlx::Error> {
        self.anime_list(
            "WHERE ranking IS NOT NULL ORDER BY ranking ASC, title_en ASC",
            limit,
            offset,
        )
        .await
    }

    /// Most episodes first, ties broken by ranking.
    pub async fn most_popular(&self, limit: u32, offset: u32) -> Result<Vec<Anime>, sqlx::Error> {
        self.anime_list(
            "ORDER BY episodes IS NULL, episodes DESC, ranking IS NULL, ranking ASC, title_en ASC",
            limit,
            offset,
        )
        .await
    }

    /// Most recently created first.
    pub async fn newest(&self, limit: u32, offset: u32) -> Result<Vec<Anime>, sqlx::Error> {
        self.anime_list(
            "WHERE created_at IS NOT NULL ORDER BY created_at DESC, id ASC",
            limit,
            offset,
        )
        .await
    }

    async fn anime_list(&self, tail: &str, limit: u32, offset: u32) -> Result<Vec<Anime>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {ANIME_COLUMNS} FROM anime {tail} LIMIT ? OFFSET ?"
        ))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(anime_from_row).collect()
    }

    /// Substring match over English, Japanese and romaji titles.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<Anime>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "SELECT {ANIME_COLUMNS} FROM anime \
             WHERE title_en LIKE ?1 ESCAPE '\\' \
                OR title_jp LIKE ?1 ESCAPE '\\' \
                OR title_romaji LIKE ?1 ESCAPE '\\' \
             ORDER BY ranking IS NULL, ranking ASC, title_en ASC \
             LIMIT ?2"
        ))
        .bind(pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(anime_from_row).collect()
    }

    pub async fn anime_by_tag(&self, tag: &str, limit: u32) -> Result<Vec<Anime>, sqlx::Error> {
        let columns = prefixed("a", ANIME_COLUMNS);
        let rows = sqlx::query(&format!(
            "SELECT {columns} FROM anime a \
             JOIN anime_tags m ON m.anime_id = a.id \
             JOIN tags t ON t.id = m.tag_id \
             WHERE t.name = ? \
             ORDER BY a.ranking IS NULL, a.ranking ASC, a.title_en ASC \
             LIMIT ?"
        ))
        .bind(tag)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(anime_from_row).collect()
    }

    pub async fn tags_for_anime(&self, anime_id: &str) -> Result<Vec<Tag>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT t.id, t.name FROM tags t \
             JOIN anime_tags m ON m.tag_id = t.id \
             WHERE m.anime_id = ? ORDER BY t.name",
        )
        .bind(anime_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tag_from_row).collect()
    }

    pub async fn seasons_for_anime(&self, anime_id: &str) -> Result<Vec<AnimeSeason>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, anime_id, season, status, episode_count, notes, created_at, updated_at \
             FROM anime_seasons WHERE anime_id = ? ORDER BY season",
        )
        .bind(anime_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(season_from_row).collect()
    }

    /// Anime rows for `ids`, in no particular order.
    pub async fn anime_by_ids(&self, ids: &[String]) -> Result<Vec<Anime>, sqlx::Error> {
        let mut anime = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK_SIZE) {
            let mut query = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {ANIME_COLUMNS} FROM anime WHERE id IN ("
            ));
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
            for row in query.build().fetch_all(&self.pool).await? {
                anime.push(anime_from_row(&row)?);
            }
        }
        Ok(anime)
    }

    /// Episodes of `anime_ids`, ordered by anime then episode number.
    pub async fn episodes_by_anime_ids(
        &self,
        anime_ids: &[String],
    ) -> Result<Vec<AnimeEpisode>, sqlx::Error> {
        let mut episodes = Vec::new();
        for chunk in anime_ids.chunks(IN_CHUNK_SIZE) {
            let mut query = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {EPISODE_COLUMNS} FROM episodes WHERE anime_id IN ("
            ));
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(") ORDER BY anime_id ASC, episode ASC");
            for row in query.build().fetch_all(&self.pool).await? {
                episodes.push(episode_from_row(&row, "")?);
            }
        }
        Ok(episodes)
    }

    /// Anime with at least one episode aired in `[from, to)`, each carrying
    /// those episodes in episode order.
    pub async fn airing_candidates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Anime>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {EPISODE_COLUMNS} FROM episodes \
             WHERE aired IS NOT NULL AND aired >= ? AND aired < ? \
             ORDER BY anime_id ASC, episode ASC"
        ))
        .bind(format_jst(from))
        .bind(format_jst(to))
        .fetch_all(&self.pool)
        .await?;

        let mut by_anime: HashMap<String, Vec<AnimeEpisode>> = HashMap::new();
        for row in &rows {
            let episode = episode_from_row(row, "")?;
            by_anime.entry(episode.anime_id.clone()).or_default().push(episode);
        }

        let ids: Vec<String> = by_anime.keys().cloned().collect();
        let mut anime = self.anime_by_ids(&ids).await?;
        for entry in &mut anime {
            entry.anime_episodes = by_anime.remove(&entry.id).unwrap_or_default();
        }
        anime.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(episodes = rows.len(), anime = anime.len(), "Loaded airing candidates");
        Ok(anime)
    }

    /// Distinct anime ids assigned to `season`.
    pub async fn anime_ids_for_season(&self, season: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT anime_id FROM anime_seasons \
             WHERE season = ? AND anime_id IS NOT NULL ORDER BY anime_id",
        )
        .bind(season)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| row.try_get("anime_id")).collect()
    }
}

/// `a.id, a.title_en, ...` from a plain column list.
pub(crate) fn prefixed(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
