//! Season query planner
//!
//! One entry point, [`SeasonPlanner::find_by_season`], picks a physical
//! strategy from the shape of the query:
//!
//! - no episodes and a non-empty field selection: `FieldSelective`
//! - no episodes: `AnimeOnly`
//! - episodes, batched: `Batched`
//! - episodes: `OptimizedProjection`
//!
//! `JoinAll` is only reachable through [`SeasonPlanner::execute`].

mod fields;
mod strategies;

pub use fields::{FIELD_COLUMNS, FieldSelection, IDENTITY_COLUMNS, column_for};
pub use strategies::Strategy;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogResult;
use crate::models::{Anime, Season};
use crate::storage::CatalogStore;

/// Caller's view of a season query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeasonQuery {
    pub season: String,
    pub with_episodes: bool,
    pub fields: Option<FieldSelection>,
    pub batched: bool,
}

impl SeasonQuery {
    pub fn new(season: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_episodes(mut self, batched: bool) -> Self {
        self.with_episodes = true;
        self.batched = batched;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: FieldSelection) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Strategy chosen for this query.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        let narrow = self.fields.as_ref().is_some_and(|fields| !fields.is_empty());
        match (self.with_episodes, self.batched) {
            (false, _) if narrow => Strategy::FieldSelective,
            (false, _) => Strategy::AnimeOnly,
            (true, true) => Strategy::Batched,
            (true, false) => Strategy::OptimizedProjection,
        }
    }

    /// Requested logical fields, sorted; empty for a full projection.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.as_ref().map(FieldSelection::fields).unwrap_or_default()
    }
}

/// Serializable summary of a plan, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub season: String,
    pub strategy: String,
    pub rows: usize,
    pub elapsed_ms: u128,
}

/// Runs season queries against the catalog store.
#[derive(Debug, Clone)]
pub struct SeasonPlanner {
    store: CatalogStore,
}

impl SeasonPlanner {
    #[must_use]
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    /// Anime of a season, using the strategy chosen by the query shape.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for a malformed season (before touching storage) and
    /// `Storage` when a query fails.
    pub async fn find_by_season(&self, query: &SeasonQuery) -> CatalogResult<Vec<Anime>> {
        self.execute(query.strategy(), &query.season, query.fields.as_ref())
            .await
    }

    /// Anime of a season, using an explicit strategy.
    ///
    /// Results are ordered by ranking then English title regardless of the
    /// strategy; episodes, when present, by episode number.
    ///
    /// # Errors
    ///
    /// Same as [`Self::find_by_season`].
    pub async fn execute(
        &self,
        strategy: Strategy,
        season: &str,
        fields: Option<&FieldSelection>,
    ) -> CatalogResult<Vec<Anime>> {
        let season = Season::parse(season)?.to_string();
        let start = Instant::now();

        let mut anime = match strategy {
            Strategy::JoinAll => strategies::join_all(&self.store, &season).await?,
            Strategy::OptimizedProjection => {
                strategies::optimized_projection(&self.store, &season).await?
            }
            Strategy::AnimeOnly => strategies::anime_only(&self.store, &season).await?,
            Strategy::Batched => strategies::batched(&self.store, &season).await?,
            Strategy::FieldSelective => {
                let empty = FieldSelection::default();
                strategies::field_selective(&self.store, &season, fields.unwrap_or(&empty)).await?
            }
        };
        anime.sort_by(|a, b| (a.ranking, &a.title_en).cmp(&(b.ranking, &b.title_en)));

        let summary = PlanSummary {
            season,
            strategy: strategy.name().to_string(),
            rows: anime.len(),
            elapsed_ms: start.elapsed().as_millis(),
        };
        debug!(
            season = %summary.season,
            strategy = %summary.strategy,
            rows = summary.rows,
            elapsed_ms = %summary.elapsed_ms,
            "Season query planned"
        );
        Ok(anime)
    }
}
