//! Storage layer: a TTL key/value backend shared by the result cache and
//! the task store.
//!
//! - [`KvBackend`]: the backend seam, with [`MemoryBackend`] and
//!   [`PgBackend`] implementations.
//! - [`ResultCache`]: namespaced artifact and session-metadata cache.
//! - [`TaskStore`]: short-lived task records with merge-on-update.

pub mod backend;
pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod task_store;

pub use backend::{KeyStat, KvBackend};
pub use cache::{CacheStats, CacheTtls, ResultCache};
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use task_store::TaskStore;

use sqlx::postgres::PgPoolOptions;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify connectivity.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
