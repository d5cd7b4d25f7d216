//! Relational catalog storage (SQLite through `sqlx`)

mod pool;
pub mod rows;
mod schema;
mod store;

pub use pool::{connect_pool, pool_options, spawn_pool_gauges};
pub use schema::{SCHEMA, migrate};
pub use store::{CatalogStore, IN_CHUNK_SIZE};
pub(crate) use store::{ANIME_COLUMNS, prefixed};
