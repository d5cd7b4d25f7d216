//! Catalog read service
//!
//! Read-through access to the catalog: every lookup tries its cache layer
//! first, falls back to storage on a miss or a cache failure, and schedules
//! a background write of what storage returned. Storage errors surface;
//! cache errors never fail a read.
//!
//! | Read | Layer | TTL |
//! |---|---|---|
//! | anime by id, ranked lists, search, tag | pruned | anime |
//! | anime with episodes | separated | anime |
//! | episodes by anime, episode by id | pruned | episode |
//! | season buckets | compressed | season |
//! | currently airing | compressed | episode |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::airing::{self, AiringRequest};
use crate::compression::CompressedCache;
use crate::config::{CacheConfig, CacheTtls};
use crate::error::{CacheError, CatalogError, CatalogResult};
use crate::invalidation::InvalidationCoordinator;
use crate::json_cache::JsonCacheService;
use crate::keys::{KeyBuilder, RankedList};
use crate::models::{Anime, AnimeEpisode, AnimeWithNextEpisode, Season};
use crate::planner::{SeasonPlanner, SeasonQuery};
use crate::pruning::{CacheEntity, PruneRules, PrunedCache};
use crate::rebuild::RebuildCoordinator;
use crate::separation::{SEPARABLE_FIELDS, SeparatedCache};
use crate::storage::CatalogStore;
use crate::traits::JsonLayer;

/// Episodes aired this long before the window start are still loaded, so a
/// show that aired just before midnight keeps its "just aired" badge.
const AIRING_LOOKBACK: chrono::Duration = chrono::Duration::days(1);

pub struct CatalogService {
    store: CatalogStore,
    planner: SeasonPlanner,
    keys: KeyBuilder,
    ttls: CacheTtls,
    cache: Arc<JsonCacheService>,
    compressed: Arc<CompressedCache>,
    pruned: PrunedCache,
    separated: SeparatedCache,
    invalidation: InvalidationCoordinator,
    rebuild: RebuildCoordinator,
}

impl CatalogService {
    /// Stack the cache layers over `cache` as configured.
    #[must_use]
    pub fn new(store: CatalogStore, cache: Arc<JsonCacheService>, config: &CacheConfig) -> Self {
        let keys = KeyBuilder::new(config.namespace.clone());
        let ttls = config.ttls();
        let compressed = Arc::new(CompressedCache::new(
            Arc::clone(&cache),
            config.compression_threshold_bytes,
        ));

        Self {
            planner: SeasonPlanner::new(store.clone()),
            store,
            pruned: PrunedCache::new(Arc::clone(&compressed), PruneRules::standard()),
            separated: SeparatedCache::new(
                Arc::clone(&compressed),
                PruneRules::extended(),
                config.max_episodes_in_cache,
            ),
            invalidation: InvalidationCoordinator::new(Arc::clone(&cache), keys.clone()),
            rebuild: RebuildCoordinator::new(Arc::clone(&cache), ttls.lock, config.use_rebuild_lock),
            compressed,
            cache,
            keys,
            ttls,
        }
    }

    #[must_use]
    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    #[must_use]
    pub fn planner(&self) -> &SeasonPlanner {
        &self.planner
    }

    #[must_use]
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<JsonCacheService> {
        &self.cache
    }

    #[must_use]
    pub fn invalidation(&self) -> &InvalidationCoordinator {
        &self.invalidation
    }

    #[must_use]
    pub fn rebuilds_in_flight(&self) -> usize {
        self.rebuild.in_flight()
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn anime_by_id(&self, id: &str) -> CatalogResult<Option<Anime>> {
        let key = self.keys.anime_by_id(id);
        self.read_through(&self.pruned, &key, self.ttls.anime, move || async move {
            self.store.anime_by_id(id).await.map_err(CatalogError::from)
        })
        .await
    }

    /// Anime with its episodes, cached through the separation layer.
    ///
    /// The parent and its detached episodes are separate entries; both must
    /// be present for a hit.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn anime_with_episodes(&self, id: &str) -> CatalogResult<Option<Anime>> {
        let key = self.keys.anime_detail(id);
        if let Some(hit) = self.lookup_detail(&key).await {
            return Ok(Some(hit));
        }

        let permit = self.rebuild.begin(&key).await;
        if let Some(hit) = self.lookup_detail(&key).await {
            self.rebuild.finish(permit).await;
            return Ok(Some(hit));
        }

        let loaded = match self.store.anime_with_episodes(id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.rebuild.finish(permit).await;
                return Err(e.into());
            }
        };
        if let Some(anime) = loaded.as_ref().filter(|_| permit.may_write()) {
            self.write_entry(&self.separated, &key, anime, self.ttls.anime).await;
        }
        self.rebuild.finish(permit).await;
        Ok(loaded)
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn episodes_by_anime(&self, anime_id: &str) -> CatalogResult<Vec<AnimeEpisode>> {
        let key = self.keys.episodes_by_anime(anime_id);
        self.read_through_list(&self.pruned, &key, self.ttls.episode, move || async move {
            self.store
                .episodes_by_anime(anime_id)
                .await
                .map_err(CatalogError::from)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn episode_by_id(&self, id: &str) -> CatalogResult<Option<AnimeEpisode>> {
        let key = self.keys.episode_by_id(id);
        self.read_through(&self.pruned, &key, self.ttls.episode, move || async move {
            self.store.episode_by_id(id).await.map_err(CatalogError::from)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn top_rated(&self, limit: u32, offset: u32) -> CatalogResult<Vec<Anime>> {
        self.ranked(RankedList::TopRated, limit, offset).await
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn most_popular(&self, limit: u32, offset: u32) -> CatalogResult<Vec<Anime>> {
        self.ranked(RankedList::MostPopular, limit, offset).await
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn newest(&self, limit: u32, offset: u32) -> CatalogResult<Vec<Anime>> {
        self.ranked(RankedList::Newest, limit, offset).await
    }

    async fn ranked(&self, list: RankedList, limit: u32, offset: u32) -> CatalogResult<Vec<Anime>> {
        let key = self.keys.ranked(list, limit, offset);
        self.read_through_list(&self.pruned, &key, self.ttls.anime, move || async move {
            let rows = match list {
                RankedList::TopRated => self.store.top_rated(limit, offset).await,
                RankedList::MostPopular => self.store.most_popular(limit, offset).await,
                RankedList::Newest => self.store.newest(limit, offset).await,
            };
            rows.map_err(CatalogError::from)
        })
        .await
    }

    /// Title substring search.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn search(&self, query: &str, limit: u32) -> CatalogResult<Vec<Anime>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let key = self.keys.search(query, limit);
        self.read_through_list(&self.pruned, &key, self.ttls.anime, move || async move {
            self.store.search(query, limit).await.map_err(CatalogError::from)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn anime_by_tag(&self, tag: &str, limit: u32) -> CatalogResult<Vec<Anime>> {
        let key = self.keys.anime_by_tag(tag, limit);
        self.read_through_list(&self.pruned, &key, self.ttls.anime, move || async move {
            self.store
                .anime_by_tag(tag, limit)
                .await
                .map_err(CatalogError::from)
        })
        .await
    }

    /// Anime of a season through the planner, cached per bucket.
    ///
    /// # Errors
    ///
    /// Returns `Parse` for a malformed season, without touching the cache
    /// or storage, and `Storage` when the database fails on a cache miss.
    pub async fn anime_by_season(&self, query: &SeasonQuery) -> CatalogResult<Vec<Anime>> {
        let season = Season::parse(&query.season)?.to_string();
        let key = if query.with_episodes {
            self.keys.anime_season_with_episodes(&season)
        } else {
            self.keys.anime_season(&season, &query.field_names())
        };
        self.read_through_list(self.compressed.as_ref(), &key, self.ttls.season, move || async move {
            self.planner.find_by_season(query).await
        })
        .await
    }

    /// Anime airing around `now`, ranked and capped.
    ///
    /// # Errors
    ///
    /// Returns `Storage` when the database fails on a cache miss.
    pub async fn currently_airing(
        &self,
        request: &AiringRequest,
        now: DateTime<Utc>,
    ) -> CatalogResult<Vec<AnimeWithNextEpisode>> {
        let window = request.window(now);
        let key = self.keys.currently_airing(
            request.limit,
            window.start_utc(),
            window.end_utc(),
            request.days,
        );
        self.read_through_list(self.compressed.as_ref(), &key, self.ttls.episode, move || async move {
            let candidates = self
                .store
                .airing_candidates(window.start_utc() - AIRING_LOOKBACK, window.end_utc())
                .await
                .map_err(CatalogError::from)?;
            debug!(
                candidates = candidates.len(),
                start = %window.start,
                end = %window.end,
                "Ranking currently airing anime"
            );
            Ok::<_, CatalogError>(airing::currently_airing(
                candidates,
                &window,
                now,
                request.limit,
            ))
        })
        .await
    }

    /// Read-through for list results; lists are cached even when empty.
    async fn read_through_list<L, T, F, Fut>(
        &self,
        layer: &L,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> CatalogResult<Vec<T>>
    where
        L: JsonLayer,
        T: Serialize + DeserializeOwned + Send + Sync,
        Vec<T>: CacheEntity,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CatalogResult<Vec<T>>>,
    {
        let loaded = self
            .read_through(layer, key, ttl, move || async move { load().await.map(Some) })
            .await?;
        Ok(loaded.unwrap_or_default())
    }

    /// Cache lookup, then a coalesced rebuild from `load` on a miss.
    /// `None` from storage is returned but never cached.
    async fn read_through<L, T, F, Fut>(
        &self,
        layer: &L,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> CatalogResult<Option<T>>
    where
        L: JsonLayer,
        T: Serialize + DeserializeOwned + CacheEntity + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CatalogResult<Option<T>>>,
    {
        if let Some(hit) = self.lookup(layer, key).await {
            return Ok(Some(hit));
        }

        let permit = self.rebuild.begin(key).await;
        // Another caller may have rebuilt the entry while we waited.
        if let Some(hit) = self.lookup(layer, key).await {
            self.rebuild.finish(permit).await;
            return Ok(Some(hit));
        }

        let loaded = match load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.rebuild.finish(permit).await;
                return Err(e);
            }
        };
        if let Some(value) = loaded.as_ref().filter(|_| permit.may_write()) {
            self.write_entry(layer, key, value, ttl).await;
        }
        self.rebuild.finish(permit).await;
        Ok(loaded)
    }

    async fn lookup<L, T>(&self, layer: &L, key: &str) -> Option<T>
    where
        L: JsonLayer,
        T: DeserializeOwned + Send,
    {
        let result: Result<Option<T>, CacheError> = layer.get_json(key).await;
        match result {
            Ok(Some(hit)) => {
                debug!(key = %key, layer = layer.name(), "Cache hit");
                Some(hit)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, layer = layer.name(), error = %e, "Cache lookup failed, falling back to storage");
                None
            }
        }
    }

    async fn write_entry<L, T>(&self, layer: &L, key: &str, value: &T, ttl: Duration)
    where
        L: JsonLayer,
        T: Serialize + CacheEntity + Sync + ?Sized,
    {
        match layer.set_json(key, value, ttl).await {
            Ok(()) => debug!(key = %key, layer = layer.name(), "Scheduled cache write"),
            Err(e) => warn!(key = %key, layer = layer.name(), error = %e, "Failed to cache value"),
        }
    }

    /// Parent and separated children under `key`.
    ///
    /// A parent that still carries its episode field was stored without
    /// separation and is complete on its own.
    async fn lookup_detail(&self, key: &str) -> Option<Anime> {
        let parent: Value = self.lookup(&self.separated, key).await?;
        let inline = parent
            .as_object()
            .is_some_and(|map| SEPARABLE_FIELDS.iter().any(|field| map.contains_key(*field)));

        let mut anime: Anime = match serde_json::from_value(parent) {
            Ok(anime) => anime,
            Err(e) => {
                warn!(key = %key, error = %e, "Cached anime detail has the wrong shape, evicting");
                self.cache.evict_in_background(key);
                return None;
            }
        };
        if inline {
            return Some(anime);
        }

        let children: Vec<AnimeEpisode> = match self.separated.get_children(key).await {
            Ok(Some(children)) => children,
            Ok(None) => {
                debug!(key = %key, "Anime detail cached without its episodes");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Separated episode lookup failed");
                return None;
            }
        };
        anime.anime_episodes = children;
        anime.sort_episodes();
        Some(anime)
    }
}
