//! Rebuild coordination
//!
//! Concurrent misses for the same key are coalesced in-process: the first
//! caller takes a per-key mutex and rebuilds, later callers wait on it and
//! re-check the cache. Across processes an advisory `<key>:lock` entry is
//! taken with `set_if_absent`; a caller that does not get it still serves
//! what it loaded but must not write the entry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::json_cache::JsonCacheService;
use crate::keys::lock_key;
use crate::traits::JsonLayer;

type InFlight = DashMap<String, Arc<Mutex<()>>>;

/// Removes the in-flight entry when the rebuild ends, even on early return
/// or panic.
struct CleanupGuard {
    map: Arc<InFlight>,
    key: String,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Advisory lock held in the cache under `<key>:lock`.
#[derive(Debug)]
struct DistributedLock {
    key: String,
    token: String,
}

/// Right to rebuild one cache entry.
///
/// Field order matters: the in-flight entry is removed before the mutex is
/// released.
pub struct RebuildPermit {
    _cleanup: CleanupGuard,
    _guard: OwnedMutexGuard<()>,
    lock: Option<DistributedLock>,
    may_write: bool,
}

impl RebuildPermit {
    /// Whether the holder may write the rebuilt entry.
    #[must_use]
    pub fn may_write(&self) -> bool {
        self.may_write
    }
}

impl std::fmt::Debug for RebuildPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildPermit")
            .field("lock", &self.lock)
            .field("may_write", &self.may_write)
            .finish_non_exhaustive()
    }
}

pub struct RebuildCoordinator {
    cache: Arc<JsonCacheService>,
    in_flight: Arc<InFlight>,
    lock_ttl: Duration,
    use_lock: bool,
}

impl RebuildCoordinator {
    #[must_use]
    pub fn new(cache: Arc<JsonCacheService>, lock_ttl: Duration, use_lock: bool) -> Self {
        Self {
            cache,
            in_flight: Arc::new(DashMap::new()),
            lock_ttl,
            use_lock,
        }
    }

    /// Number of keys currently being rebuilt in this process.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for any in-process rebuild of `key`, then try the advisory lock.
    pub async fn begin(&self, key: &str) -> RebuildPermit {
        let mutex = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        let cleanup = CleanupGuard {
            map: Arc::clone(&self.in_flight),
            key: key.to_string(),
        };

        let (lock, may_write) = if self.use_lock {
            match self.acquire(key).await {
                Some(lock) => (Some(lock), true),
                None => (None, false),
            }
        } else {
            (None, true)
        };

        RebuildPermit {
            _cleanup: cleanup,
            _guard: guard,
            lock,
            may_write,
        }
    }

    /// Release the advisory lock if this permit still owns it.
    pub async fn finish(&self, mut permit: RebuildPermit) {
        let Some(lock) = permit.lock.take() else {
            return;
        };
        match self.cache.get_bytes(&lock.key).await {
            Ok(Some(bytes)) if bytes == lock.token.as_bytes() => {
                if let Err(e) = self.cache.delete(&lock.key).await {
                    warn!(lock = %lock.key, error = %e, "Failed to release rebuild lock");
                }
            }
            Ok(_) => debug!(lock = %lock.key, "Rebuild lock expired or taken over"),
            Err(e) => warn!(lock = %lock.key, error = %e, "Failed to read rebuild lock"),
        }
    }

    async fn acquire(&self, key: &str) -> Option<DistributedLock> {
        let lock = DistributedLock {
            key: lock_key(key),
            token: Uuid::new_v4().to_string(),
        };
        match self
            .cache
            .set_if_absent(&lock.key, lock.token.as_bytes(), self.lock_ttl)
            .await
        {
            Ok(true) => Some(lock),
            Ok(false) => {
                debug!(key = %key, "Rebuild lock held elsewhere, serving without caching");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to take rebuild lock");
                None
            }
        }
    }
}
