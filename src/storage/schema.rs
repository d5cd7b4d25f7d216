//! Catalog schema
//!
//! Timestamps are naive Japan-local `YYYY-MM-DD HH:MM:SS` text and
//! string lists are JSON text, matching the data already on disk.

use sqlx::SqlitePool;
use tracing::info;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS anime (
    id             TEXT PRIMARY KEY,
    title_en       TEXT NOT NULL DEFAULT '',
    title_jp       TEXT NOT NULL DEFAULT '',
    title_romaji   TEXT NOT NULL DEFAULT '',
    title_kanji    TEXT NOT NULL DEFAULT '',
    title_synonyms TEXT,
    synopsis       TEXT,
    image_url      TEXT,
    episodes       INTEGER,
    status         TEXT,
    start_date     TEXT,
    end_date       TEXT,
    genres         TEXT,
    duration       TEXT,
    broadcast      TEXT,
    source         TEXT,
    licensors      TEXT,
    studios        TEXT,
    rating         TEXT,
    ranking        INTEGER,
    created_at     TEXT,
    updated_at     TEXT
);

CREATE TABLE IF NOT EXISTS episodes (
    id         TEXT PRIMARY KEY,
    anime_id   TEXT NOT NULL REFERENCES anime(id) ON DELETE CASCADE,
    episode    INTEGER NOT NULL,
    title_en   TEXT,
    title_jp   TEXT,
    aired      TEXT,
    synopsis   TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_episodes_anime_episode ON episodes(anime_id, episode);
CREATE INDEX IF NOT EXISTS idx_episodes_aired ON episodes(aired);

CREATE TABLE IF NOT EXISTS anime_seasons (
    id            TEXT PRIMARY KEY,
    anime_id      TEXT REFERENCES anime(id) ON DELETE SET NULL,
    season        TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'unknown'
                  CHECK (status IN ('unknown', 'confirmed', 'announced', 'cancelled')),
    episode_count INTEGER,
    notes         TEXT,
    created_at    TEXT,
    updated_at    TEXT
);

CREATE INDEX IF NOT EXISTS idx_anime_seasons_season ON anime_seasons(season);

CREATE TABLE IF NOT EXISTS tags (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS anime_tags (
    anime_id TEXT NOT NULL REFERENCES anime(id) ON DELETE CASCADE,
    tag_id   INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (anime_id, tag_id)
);
"#;

/// Create any missing tables and indexes.
///
/// # Errors
///
/// Returns the underlying `sqlx::Error` if a statement fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("Catalog schema ready");
    Ok(())
}
