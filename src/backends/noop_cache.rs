//! No-op Cache
//!
//! Selected when caching is disabled: every read misses, every write is
//! accepted and dropped.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use crate::traits::CacheBackend;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl NoopCache {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn remove_pattern(&self, _pattern: &str) -> Result<usize> {
        Ok(0)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn set_if_absent(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool> {
        Ok(false)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Noop"
    }
}
