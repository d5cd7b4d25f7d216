//! Configuration
//!
//! Loaded from a TOML file, then overridden from environment variables.
//! Every section falls back to its defaults, so an empty file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::keys::DEFAULT_NAMESPACE;

/// Hard caps on the shared database pool.
pub const MAX_OPEN_CONNECTIONS: u32 = 25;
pub const MAX_IDLE_CONNECTIONS: u32 = 10;
pub const MAX_CONNECTION_LIFETIME_SECS: u64 = 300;
pub const MAX_IDLE_TIME_SECS: u64 = 90;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "anime-api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the no-op backend is used and every lookup misses.
    pub enabled: bool,
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub namespace: String,

    pub anime_data_ttl_minutes: u64,
    pub episode_ttl_minutes: u64,
    pub season_ttl_minutes: u64,
    pub lock_ttl_seconds: u64,

    /// Payloads at or above this size are gzip-compressed.
    pub compression_threshold_bytes: usize,
    /// Child collections longer than this are stored under their own key.
    pub max_episodes_in_cache: usize,

    /// Deadline for each background write.
    pub write_timeout_ms: u64,
    /// Deadline for each foreground cache call.
    pub operation_timeout_ms: u64,
    pub connect_timeout_secs: u64,

    /// Take the `<key>:lock` advisory lock before rebuilding an entry.
    pub use_rebuild_lock: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            namespace: DEFAULT_NAMESPACE.to_string(),
            anime_data_ttl_minutes: 60,
            episode_ttl_minutes: 30,
            season_ttl_minutes: 120,
            lock_ttl_seconds: 10,
            compression_threshold_bytes: 1024,
            max_episodes_in_cache: 0,
            write_timeout_ms: 2_000,
            operation_timeout_ms: 500,
            connect_timeout_secs: 5,
            use_rebuild_lock: true,
        }
    }
}

impl CacheConfig {
    /// `redis://[:password@]host:port/db`
    #[must_use]
    pub fn redis_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Minute settings saturate rather than overflow.
    #[must_use]
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            anime: minutes(self.anime_data_ttl_minutes),
            episode: minutes(self.episode_ttl_minutes),
            season: minutes(self.season_ttl_minutes),
            lock: Duration::from_secs(self.lock_ttl_seconds),
        }
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Per-family TTLs derived from [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub anime: Duration,
    pub episode: Duration,
    pub season: Duration,
    pub lock: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        CacheConfig::default().ttls()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_open: u32,
    pub max_idle: u32,
    pub max_lifetime_secs: u64,
    pub max_idle_time_secs: u64,
    /// Interval between pool gauge exports; 0 disables the exporter.
    pub gauge_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://anime.db?mode=rwc".to_string(),
            max_open: MAX_OPEN_CONNECTIONS,
            max_idle: MAX_IDLE_CONNECTIONS,
            max_lifetime_secs: 300,
            max_idle_time_secs: 90,
            gauge_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment override has an invalid value.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        info!(path = %path.display(), environment = %config.app.environment, "Loaded configuration");
        Ok(config)
    }

    /// Defaults plus environment overrides, for deployments without a file.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment override has an invalid value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if `raw` is not valid TOML for this schema.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `CACHE_ENABLED`, `CACHE_BACKEND`, `REDIS_HOST`, `REDIS_PORT`,
    /// `REDIS_PASSWORD`, `REDIS_DB`, `DATABASE_URL`, `APP_ENV`, `PORT` and
    /// `LOG_LEVEL`.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean variable does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("CACHE_ENABLED") {
            self.cache.enabled = parse_bool(&v).with_context(|| format!("Invalid CACHE_ENABLED: {v}"))?;
        }
        if let Some(v) = lookup("CACHE_BACKEND") {
            self.cache.backend = match v.to_ascii_lowercase().as_str() {
                "redis" => BackendKind::Redis,
                "memory" => BackendKind::Memory,
                other => anyhow::bail!("Invalid CACHE_BACKEND: {other}"),
            };
        }
        if let Some(v) = lookup("REDIS_HOST") {
            self.cache.host = v;
        }
        if let Some(v) = lookup("REDIS_PORT") {
            self.cache.port = v.parse().with_context(|| format!("Invalid REDIS_PORT: {v}"))?;
        }
        if let Some(v) = lookup("REDIS_PASSWORD") {
            self.cache.password = Some(v);
        }
        if let Some(v) = lookup("REDIS_DB") {
            self.cache.db = v.parse().with_context(|| format!("Invalid REDIS_DB: {v}"))?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = lookup("APP_ENV") {
            self.app.environment = v;
        }
        if let Some(v) = lookup("PORT") {
            self.app.port = v.parse().with_context(|| format!("Invalid PORT: {v}"))?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.namespace.trim().is_empty() {
            anyhow::bail!("cache.namespace must not be empty");
        }
        for (name, value) in [
            ("cache.anime_data_ttl_minutes", cache.anime_data_ttl_minutes),
            ("cache.episode_ttl_minutes", cache.episode_ttl_minutes),
            ("cache.season_ttl_minutes", cache.season_ttl_minutes),
            ("cache.lock_ttl_seconds", cache.lock_ttl_seconds),
            ("cache.write_timeout_ms", cache.write_timeout_ms),
            ("cache.operation_timeout_ms", cache.operation_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }

        let db = &self.database;
        if db.max_open == 0 || db.max_open > MAX_OPEN_CONNECTIONS {
            anyhow::bail!("database.max_open must be within 1..={MAX_OPEN_CONNECTIONS}");
        }
        if db.max_idle > MAX_IDLE_CONNECTIONS || db.max_idle > db.max_open {
            anyhow::bail!("database.max_idle must be at most {MAX_IDLE_CONNECTIONS} and not exceed max_open");
        }
        if db.max_lifetime_secs == 0 || db.max_lifetime_secs > MAX_CONNECTION_LIFETIME_SECS {
            anyhow::bail!("database.max_lifetime_secs must be within 1..={MAX_CONNECTION_LIFETIME_SECS}");
        }
        if db.max_idle_time_secs == 0 || db.max_idle_time_secs > MAX_IDLE_TIME_SECS {
            anyhow::bail!("database.max_idle_time_secs must be within 1..={MAX_IDLE_TIME_SECS}");
        }
        Ok(())
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}
