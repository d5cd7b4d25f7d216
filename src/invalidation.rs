//! Cache invalidation coordinator
//!
//! Mutation events are translated into key and glob-pattern deletions. The
//! event-to-target table is fixed:
//!
//! | Event | Deletes |
//! |---|---|
//! | `AnimeMutated { anime_id }` | anime by id, its episodes, `:*anime*:<id>*`, every season bucket, every `anime:*` key, airing lists |
//! | `EpisodesMutated { anime_id }` | episodes by anime, the anime detail entry and its separated episodes |
//! | `SeasonsMutated` | every season bucket |
//! | `RankedListsStale` | `top_rated`, `most_popular` and `newest` lists |
//! | `AllAnime` | every `anime:*` key, every season bucket, airing lists |
//! | `FullFlush` | `*` |
//!
//! Pending background writes are awaited before anything is deleted, so a
//! write scheduled before the event cannot resurrect an invalidated key.
//! Pattern deletion enumerates then deletes; keys created in between may
//! survive a pass, so each pattern is retried until a pass removes nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::json_cache::JsonCacheService;
use crate::keys::{KeyBuilder, RankedList, separated_children_key};
use crate::telemetry;
use crate::traits::JsonLayer;

/// Upper bound on delete passes per pattern.
pub const MAX_PATTERN_PASSES: usize = 3;

/// Mutation events understood by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationEvent {
    /// An anime row changed.
    AnimeMutated { anime_id: String },

    /// Episodes of one anime changed.
    EpisodesMutated { anime_id: String },

    /// Season assignments changed.
    SeasonsMutated,

    /// Ranking inputs changed.
    RankedListsStale,

    /// Bulk change to the anime table.
    AllAnime,

    /// Drop everything.
    FullFlush,
}

impl InvalidationEvent {
    pub fn anime(anime_id: impl Into<String>) -> Self {
        Self::AnimeMutated {
            anime_id: anime_id.into(),
        }
    }

    pub fn episodes(anime_id: impl Into<String>) -> Self {
        Self::EpisodesMutated {
            anime_id: anime_id.into(),
        }
    }

    /// Metric label for this event.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnimeMutated { .. } => "anime_mutated",
            Self::EpisodesMutated { .. } => "episodes_mutated",
            Self::SeasonsMutated => "seasons_mutated",
            Self::RankedListsStale => "ranked_lists_stale",
            Self::AllAnime => "all_anime",
            Self::FullFlush => "full_flush",
        }
    }

    /// Keys and patterns this event removes.
    #[must_use]
    pub fn targets(&self, keys: &KeyBuilder) -> Vec<InvalidationTarget> {
        use InvalidationTarget::{Key, Pattern};

        match self {
            Self::AnimeMutated { anime_id } => vec![
                Key(keys.anime_by_id(anime_id)),
                Key(keys.episodes_by_anime(anime_id)),
                Pattern(keys.anime_invalidation_pattern(anime_id)),
                Pattern(keys.all_seasons_pattern()),
                Pattern(keys.all_anime_pattern()),
                Pattern(keys.airing_pattern()),
            ],
            Self::EpisodesMutated { anime_id } => vec![
                Key(keys.episodes_by_anime(anime_id)),
                Key(keys.anime_detail(anime_id)),
                Key(separated_children_key(&keys.anime_detail(anime_id))),
            ],
            Self::SeasonsMutated => vec![Pattern(keys.all_seasons_pattern())],
            Self::RankedListsStale => RankedList::ALL
                .iter()
                .map(|list| Pattern(keys.ranked_pattern(*list)))
                .collect(),
            Self::AllAnime => vec![
                Pattern(keys.all_anime_pattern()),
                Pattern(keys.all_seasons_pattern()),
                Pattern(keys.airing_pattern()),
            ],
            Self::FullFlush => vec![Pattern(keys.everything_pattern())],
        }
    }

    /// Serialize for transport between processes.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize invalidation event")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize invalidation event")
    }
}

/// A single deletion issued for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationTarget {
    Key(String),
    Pattern(String),
}

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub event: &'static str,
    pub targets: usize,
    pub keys_removed: usize,
}

/// Statistics for invalidation operations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationStats {
    /// Events fully processed
    pub events_processed: u64,

    /// Single-key deletes issued
    pub keys_deleted: u64,

    /// Keys removed by pattern deletes
    pub pattern_keys_removed: u64,

    /// Pattern delete passes issued
    pub pattern_passes: u64,

    /// Failed deletes
    pub errors: u64,
}

#[derive(Debug, Default)]
struct AtomicInvalidationStats {
    events_processed: AtomicU64,
    keys_deleted: AtomicU64,
    pattern_keys_removed: AtomicU64,
    pattern_passes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicInvalidationStats {
    fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            keys_deleted: self.keys_deleted.load(Ordering::Relaxed),
            pattern_keys_removed: self.pattern_keys_removed.load(Ordering::Relaxed),
            pattern_passes: self.pattern_passes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Translates mutation events into cache deletions.
pub struct InvalidationCoordinator {
    cache: Arc<JsonCacheService>,
    keys: KeyBuilder,
    stats: AtomicInvalidationStats,
}

impl InvalidationCoordinator {
    #[must_use]
    pub fn new(cache: Arc<JsonCacheService>, keys: KeyBuilder) -> Self {
        Self {
            cache,
            keys,
            stats: AtomicInvalidationStats::default(),
        }
    }

    #[must_use]
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    #[must_use]
    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    /// Process one event.
    ///
    /// Every target is attempted even when an earlier one fails; the first
    /// failure is returned after all targets ran.
    ///
    /// # Errors
    ///
    /// Returns the first `CacheError` raised by a delete.
    pub async fn handle(&self, event: &InvalidationEvent) -> Result<InvalidationReport, CacheError> {
        self.cache.quiesce().await;

        let targets = event.targets(&self.keys);
        let (keys, patterns): (Vec<_>, Vec<_>) = targets
            .iter()
            .partition(|target| matches!(target, InvalidationTarget::Key(_)));

        let mut first_error = None;
        let mut removed = 0;

        let key_results = join_all(keys.iter().map(|target| async move {
            match target {
                InvalidationTarget::Key(key) | InvalidationTarget::Pattern(key) => {
                    (key, self.cache.remove_key(key).await)
                }
            }
        }))
        .await;
        for (key, result) in key_results {
            match result {
                Ok(existed) => {
                    self.stats.keys_deleted.fetch_add(1, Ordering::Relaxed);
                    removed += usize::from(existed);
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "Invalidation delete failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        for target in patterns {
            let InvalidationTarget::Pattern(pattern) = target else {
                continue;
            };
            match self.delete_pattern_until_empty(pattern).await {
                Ok(count) => removed += count,
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(pattern = %pattern, error = %e, "Invalidation pattern delete failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        telemetry::record_invalidation(event.kind());
        info!(event = event.kind(), targets = targets.len(), removed, "Cache invalidated");

        Ok(InvalidationReport {
            event: event.kind(),
            targets: targets.len(),
            keys_removed: removed,
        })
    }

    async fn delete_pattern_until_empty(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut total = 0;
        for pass in 1..=MAX_PATTERN_PASSES {
            let count = self.cache.delete_pattern(pattern).await?;
            self.stats.pattern_passes.fetch_add(1, Ordering::Relaxed);
            self.stats
                .pattern_keys_removed
                .fetch_add(count as u64, Ordering::Relaxed);
            total += count;
            debug!(pattern = %pattern, pass, count, "Pattern delete pass");
            if count == 0 {
                break;
            }
        }
        Ok(total)
    }

    pub async fn invalidate_anime(&self, anime_id: &str) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::anime(anime_id)).await
    }

    pub async fn invalidate_episodes(&self, anime_id: &str) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::episodes(anime_id)).await
    }

    pub async fn invalidate_seasons(&self) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::SeasonsMutated).await
    }

    pub async fn invalidate_ranked_lists(&self) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::RankedListsStale).await
    }

    pub async fn invalidate_all_anime(&self) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::AllAnime).await
    }

    pub async fn flush_all(&self) -> Result<InvalidationReport, CacheError> {
        self.handle(&InvalidationEvent::FullFlush).await
    }
}
