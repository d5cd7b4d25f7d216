//! Connection pool and pool gauges

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::telemetry::DB_POOL_CONNECTIONS;

/// Pool options for `config`.
///
/// SQLite pools have no separate idle cap: idle connections are reaped by
/// the idle timeout, and `max_idle` only bounds the warm minimum.
#[must_use]
pub fn pool_options(config: &DatabaseConfig) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(config.max_open)
        .min_connections(config.max_idle.min(1))
        .idle_timeout(Some(Duration::from_secs(config.max_idle_time_secs)))
        .max_lifetime(Some(Duration::from_secs(config.max_lifetime_secs)))
}

/// Open the process-wide pool.
///
/// # Errors
///
/// Returns an error for a malformed URL or when the first connection fails.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?.foreign_keys(true);
    let pool = pool_options(config).connect_with(options).await?;
    info!(
        max_open = config.max_open,
        max_lifetime_secs = config.max_lifetime_secs,
        max_idle_time_secs = config.max_idle_time_secs,
        "Database pool connected"
    );
    Ok(pool)
}

/// Export pool gauges every `interval` until the pool is closed.
pub fn spawn_pool_gauges(pool: SqlitePool, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                debug!("Pool closed, stopping gauge export");
                break;
            }
            record_pool_gauges(&pool);
        }
    })
}

#[allow(clippy::cast_precision_loss)]
fn record_pool_gauges(pool: &SqlitePool) {
    let open = pool.size() as usize;
    let idle = pool.num_idle();
    metrics::gauge!(DB_POOL_CONNECTIONS, "state" => "open").set(open as f64);
    metrics::gauge!(DB_POOL_CONNECTIONS, "state" => "idle").set(idle as f64);
    metrics::gauge!(DB_POOL_CONNECTIONS, "state" => "in_use").set(open.saturating_sub(idle) as f64);
}
