//! SQLite adapters for persisted cooldown state.

pub mod connection;
pub mod cooldown_record_store;
pub mod migrations;

pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use cooldown_record_store::SqliteCooldownRecordStore;
pub use migrations::{all_migrations, Migration, MigrationError, Migrator};

use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open the database at `path` and bring its schema up to date.
pub async fn initialize_database(path: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(path, None).await?;
    Migrator::new(pool.clone()).run(&all_migrations()).await?;
    Ok(pool)
}

/// In-memory pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone()).run(&all_migrations()).await?;
    Ok(pool)
}
