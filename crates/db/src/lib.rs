//! Job store for the annotation pipeline.
//!
//! [`JobStore`] is the only shared mutable resource in the pipeline. Every
//! status transition goes through one of its conditional operations; two
//! implementations are provided:
//!
//! - [`PgJobStore`]: PostgreSQL via `sqlx`, used in production.
//! - [`MemoryJobStore`]: in-process map with identical semantics, used by
//!   tests and single-process runs.

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use store::{Claim, JobStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Cheap round-trip to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the migrations shipped with this crate.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
