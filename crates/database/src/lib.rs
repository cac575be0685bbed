//! CampusNet Database Crate
//!
//! Connection management, embedded migrations, shared id/timestamp helpers and
//! the retention purge used by the background jobs.

use sqlx::SqlitePool;
use thiserror::Error;

pub mod connection;
pub mod maintenance;
pub mod migrations;
pub mod time;

pub use campusnet_config::DatabaseConfig;
pub use connection::prepare_database;
pub use maintenance::{purge_expired, PurgeReport, RetentionPolicy};
pub use migrations::run_migrations;
pub use time::{
    elapsed_millis, format_timestamp, new_public_id, now_timestamp, timestamp_after,
    timestamp_before,
};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Connect to the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config)
        .await
        .map_err(|error| DatabaseError::Connection(format!("{error:#}")))?;

    run_migrations(&pool)
        .await
        .map_err(|error| DatabaseError::Migration(format!("{error:#}")))?;

    Ok(pool)
}

/// True when the error is a UNIQUE or PRIMARY KEY constraint violation.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
