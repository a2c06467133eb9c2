//! SQLite persistence layer.
//!
//! Repositories here implement the `hive-core` repository traits over a
//! sqlx connection pool. Structured fields (assignees, timelines, context
//! sections) are stored as JSON in TEXT columns. Every repository is
//! constructed with a [`Scope`](hive_core::Scope) and filters reads and
//! writes by the owning user; system scope skips filtering.

pub mod cache_repository;
pub mod cached;
pub mod common;
pub mod context_repository;
pub mod project_repository;
pub mod schema;
pub mod subtask_repository;
pub mod task_repository;

pub use cache_repository::SqliteContextCacheRepository;
pub use cached::CachedTaskRepository;
pub use context_repository::{SqliteContextRepository, SqliteDelegationRepository};
pub use project_repository::SqliteProjectRepository;
pub use subtask_repository::SqliteSubtaskRepository;
pub use task_repository::SqliteTaskRepository;

use hive_core::error::{DomainError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Create a connection pool and initialise the schema.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DomainError::Configuration(format!("invalid database URL: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(|e| DomainError::Database(format!("failed to connect: {e}")))?;

    schema::init_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // One connection: every connection to sqlite::memory: is its own DB.
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("static url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory pool");
    schema::init_schema(&pool).await.expect("schema");
    pool
}
