//! SQLite Persistence

mod cache_repo;
mod database;

pub use cache_repo::SqliteCacheRepository;
pub use database::{create_pool, run_migrations, DatabaseConfig, DbPool, SCHEMA_VERSION};
