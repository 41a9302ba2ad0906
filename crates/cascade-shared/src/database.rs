//! # Database Pool and Migrations
//!
//! Pool construction from [`DatabaseConfig`] plus the embedded migrator used
//! by both the server binary and `#[sqlx::test]` integration tests.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::errors::{CascadeError, CascadeResult};

/// Embedded migrations for the cascade schema
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Build a connection pool from configuration
pub async fn connect(config: &DatabaseConfig) -> CascadeResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.url)
        .await
        .map_err(|e| CascadeError::database("connect", e))
}

/// Apply pending migrations
pub async fn migrate(pool: &PgPool) -> CascadeResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| CascadeError::database("migrate", sqlx::Error::Migrate(Box::new(e))))
}
