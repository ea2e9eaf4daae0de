//! Durable storage for execution records.
//!
//! - [`ExecutionStore`]: the upsert/read seam the engine persists through.
//! - [`PgExecutionStore`]: Postgres implementation over [`ExecutionRepo`].
//! - [`MemoryExecutionStore`]: in-process implementation for tests and
//!   local runs.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use memory::MemoryExecutionStore;
pub use repositories::ExecutionRepo;
pub use store::{ExecutionStore, PgExecutionStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
