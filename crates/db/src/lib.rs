//! Persistence layer for tern.
//!
//! The federation engine talks to storage only through the [`Store`] trait.
//! [`DbStore`] is the relational implementation (`PostgreSQL` or `SQLite`);
//! [`MemoryStore`] keeps everything in process for tests and `memory` URLs.

pub mod db_store;
pub mod entities;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

pub use db_store::DbStore;
pub use memory::MemoryStore;
pub use models::{
    Account, DeliveryItem, Follow, InboundActivity, Like, Note, RemoteActor, Visibility,
};
pub use store::{Store, StoreError, StoreResult};

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tern_common::{AppError, Config};

/// `database.url` value that selects [`MemoryStore`].
pub const MEMORY_URL: &str = "memory";

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true);

    Database::connect(opt)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Open the store named by `database.url`, running migrations for
/// relational backends.
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>, AppError> {
    if config.database.url == MEMORY_URL {
        tracing::warn!("Using in-memory store; nothing survives a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let db = init(config).await?;
    migrate(&db).await?;
    tracing::info!("Database ready");
    Ok(Arc::new(DbStore::new(Arc::new(db))))
}
