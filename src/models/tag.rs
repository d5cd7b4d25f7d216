use serde::{Deserialize, Serialize};

use super::TAG_SHAPE;
use crate::pruning::{CacheEntity, EntityShape};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl CacheEntity for Tag {
    const SHAPE: &'static EntityShape = &TAG_SHAPE;
}
