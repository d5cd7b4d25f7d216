//! Field-pruning layer
//!
//! Strips heavy, optional fields from values before they are written. The
//! exclusions are a static table of entity kind to field names, applied by
//! walking the JSON value along the entity's declared shape: objects lose
//! their excluded keys, arrays are walked element-wise, `null` is left as
//! is, and nested entities are visited even when their parent has no
//! exclusions. Unknown kinds pass through untouched.
//!
//! Pruning is write-only. Readers treat pruned fields as absent, which every
//! cached model tolerates through `#[serde(default)]`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::compression::CompressedCache;
use crate::error::CacheError;
use crate::traits::JsonLayer;

/// Kinds of values the cache knows how to prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Anime,
    AnimeEpisode,
    Episode,
    AnimeSeason,
    Tag,
    /// Anything without pruning rules.
    Opaque,
}

/// Structural description of a cached value: its kind plus the fields that
/// hold nested entities.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityShape {
    pub kind: EntityKind,
    pub children: &'static [(&'static str, &'static EntityShape)],
}

impl EntityShape {
    pub const OPAQUE: Self = Self::leaf(EntityKind::Opaque);

    #[must_use]
    pub const fn leaf(kind: EntityKind) -> Self {
        Self { kind, children: &[] }
    }

    /// Shape of the nested entity stored under `field`.
    #[must_use]
    pub fn child(&self, field: &str) -> Option<&'static EntityShape> {
        self.children
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, shape)| *shape)
    }
}

/// Types that declare their cache shape.
///
/// Collections and options share the shape of their element, so a
/// `Vec<Anime>` prunes exactly like an `Anime`.
pub trait CacheEntity {
    const SHAPE: &'static EntityShape;
}

impl<T: CacheEntity> CacheEntity for Vec<T> {
    const SHAPE: &'static EntityShape = T::SHAPE;
}

impl<T: CacheEntity> CacheEntity for [T] {
    const SHAPE: &'static EntityShape = T::SHAPE;
}

impl<T: CacheEntity> CacheEntity for Option<T> {
    const SHAPE: &'static EntityShape = T::SHAPE;
}

impl<T: CacheEntity + ?Sized> CacheEntity for &T {
    const SHAPE: &'static EntityShape = T::SHAPE;
}

impl CacheEntity for Value {
    const SHAPE: &'static EntityShape = &EntityShape::OPAQUE;
}

impl CacheEntity for String {
    const SHAPE: &'static EntityShape = &EntityShape::OPAQUE;
}

/// Exclusion table: entity kind to removed field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneRules {
    exclusions: HashMap<EntityKind, BTreeSet<String>>,
}

impl PruneRules {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exclusions applied to every pruned write.
    ///
    /// | Entity | Excluded |
    /// |---|---|
    /// | Anime | synopsis, title synonyms, genres, licensors, broadcast |
    /// | AnimeEpisode | synopsis |
    /// | Episode | synopsis |
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .exclude(
                EntityKind::Anime,
                ["synopsis", "title_synonyms", "genres", "licensors", "broadcast"],
            )
            .exclude(EntityKind::AnimeEpisode, ["synopsis"])
            .exclude(EntityKind::Episode, ["synopsis"])
    }

    /// Standard exclusions plus the ones used alongside child separation:
    /// Anime also drops source and studios, AnimeEpisode drops its Japanese
    /// title.
    #[must_use]
    pub fn extended() -> Self {
        Self::standard()
            .exclude(EntityKind::Anime, ["source", "studios"])
            .exclude(EntityKind::AnimeEpisode, ["title_jp"])
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, kind: EntityKind, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions
            .entry(kind)
            .or_default()
            .extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn is_excluded(&self, kind: EntityKind, field: &str) -> bool {
        self.exclusions
            .get(&kind)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn excluded(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.exclusions
            .get(&kind)
            .into_iter()
            .flat_map(|fields| fields.iter().map(String::as_str))
    }
}

/// Walks JSON values and removes excluded fields.
#[derive(Debug, Clone)]
pub struct FieldPruner {
    rules: Arc<PruneRules>,
}

impl FieldPruner {
    #[must_use]
    pub fn new(rules: PruneRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &PruneRules {
        &self.rules
    }

    /// Prune `value` in place according to `shape`.
    pub fn prune(&self, value: &mut Value, shape: &EntityShape) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.prune(item, shape);
                }
            }
            Value::Object(map) => {
                for field in self.rules.excluded(shape.kind) {
                    map.remove(field);
                }
                for (field, child) in shape.children {
                    if let Some(nested) = map.get_mut(*field) {
                        self.prune(nested, child);
                    }
                }
            }
            _ => {}
        }
    }

    /// Serialize and prune in one step.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if `value` cannot be represented as JSON.
    pub fn to_pruned_value<T>(&self, value: &T) -> Result<Value, CacheError>
    where
        T: Serialize + CacheEntity + ?Sized,
    {
        let mut json = serde_json::to_value(value)?;
        self.prune(&mut json, T::SHAPE);
        Ok(json)
    }
}

/// Compression layer with field pruning on every write.
pub struct PrunedCache {
    inner: Arc<CompressedCache>,
    pruner: FieldPruner,
}

impl PrunedCache {
    #[must_use]
    pub fn new(inner: Arc<CompressedCache>, rules: PruneRules) -> Self {
        Self {
            inner,
            pruner: FieldPruner::new(rules),
        }
    }

    #[must_use]
    pub fn pruner(&self) -> &FieldPruner {
        &self.pruner
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<CompressedCache> {
        &self.inner
    }
}

#[async_trait]
impl JsonLayer for PrunedCache {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        self.inner.get_json(key).await
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + crate::pruning::CacheEntity + Sync + ?Sized,
    {
        let pruned = self.pruner.to_pruned_value(value)?;
        self.inner.set_json(key, &pruned, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        self.inner.delete_pattern(pattern).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    fn name(&self) -> &'static str {
        "pruned"
    }
}
