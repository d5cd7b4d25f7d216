//! Large-child separation layer
//!
//! Detaches episode collections from their parent before the parent is
//! cached. The children go to `<parentKey>:episodes` with the same TTL; the
//! parent is stored without them. A parent carrying several oversized
//! collections has them all detached, concatenated in [`SEPARABLE_FIELDS`]
//! order under the one child key. Both halves are pruned with the extended
//! exclusion rules.
//!
//! Parents and children are independent entries: a reader that needs both
//! issues both lookups and must tolerate one of them missing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::compression::CompressedCache;
use crate::error::CacheError;
use crate::keys::separated_children_key;
use crate::pruning::{CacheEntity, EntityShape, FieldPruner, PruneRules};
use crate::traits::JsonLayer;

/// Child collections are detached when longer than this. Zero means every
/// non-empty collection is detached.
pub const DEFAULT_MAX_EPISODES_IN_CACHE: usize = 0;

/// Field names that hold separable child collections.
pub const SEPARABLE_FIELDS: [&str; 2] = ["anime_episodes", "episodes"];

/// JSON layer that stores episode collections apart from their parent.
pub struct SeparatedCache {
    inner: Arc<CompressedCache>,
    pruner: FieldPruner,
    max_children: usize,
}

impl SeparatedCache {
    #[must_use]
    pub fn new(inner: Arc<CompressedCache>, rules: PruneRules, max_children: usize) -> Self {
        Self {
            inner,
            pruner: FieldPruner::new(rules),
            max_children,
        }
    }

    /// Separation layer with extended pruning and the default cap.
    #[must_use]
    pub fn with_defaults(inner: Arc<CompressedCache>) -> Self {
        Self::new(inner, PruneRules::extended(), DEFAULT_MAX_EPISODES_IN_CACHE)
    }

    #[must_use]
    pub fn max_children(&self) -> usize {
        self.max_children
    }

    /// Read the child collection separated from `parent_key`.
    ///
    /// # Errors
    ///
    /// Same as [`JsonLayer::get_json`].
    pub async fn get_children<T>(&self, parent_key: &str) -> Result<Option<Vec<T>>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        self.inner.get_json(&separated_children_key(parent_key)).await
    }

    /// Remove every oversized child collection from `value`, returning the
    /// pruned children as one array.
    fn detach(&self, value: &mut Value, shape: &EntityShape) -> Option<Value> {
        let map = value.as_object_mut()?;
        let mut detached = Vec::new();
        for field in SEPARABLE_FIELDS {
            let oversized = matches!(
                map.get(field),
                Some(Value::Array(items)) if items.len() > self.max_children
            );
            if !oversized {
                continue;
            }
            let Some(mut children) = map.remove(field) else {
                continue;
            };
            self.pruner
                .prune(&mut children, shape.child(field).unwrap_or(&EntityShape::OPAQUE));
            if let Value::Array(items) = children {
                detached.extend(items);
            }
        }
        (!detached.is_empty()).then_some(Value::Array(detached))
    }
}

#[async_trait]
impl JsonLayer for SeparatedCache {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        self.inner.get_json(key).await
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + CacheEntity + Sync + ?Sized,
    {
        let mut parent = serde_json::to_value(value)?;

        if let Some(children) = self.detach(&mut parent, T::SHAPE) {
            let child_key = separated_children_key(key);
            debug!(
                key = %key,
                child_key = %child_key,
                children = children.as_array().map_or(0, Vec::len),
                "Separating child collection"
            );
            self.inner.set_json(&child_key, &children, ttl).await?;
        }

        self.pruner.prune(&mut parent, T::SHAPE);
        self.inner.set_json(key, &parent, ttl).await
    }

    /// Deleting a parent also deletes its separated children.
    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await?;
        self.inner.delete(&separated_children_key(key)).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        self.inner.delete_pattern(pattern).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.exists(key).await
    }

    fn name(&self) -> &'static str {
        "separated"
    }
}
