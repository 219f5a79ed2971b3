//! `SQLite` connection pool and schema bootstrap.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::{AppError, Result};

use super::schema;

/// Alias for the shared pool.
pub type Database = SqlitePool;

/// Open (creating if needed) the on-disk database and apply the schema.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema bootstrap fails.
pub async fn connect(config: &DatabaseConfig) -> Result<Database> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AppError::Db(format!("failed to create db dir: {err}")))?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database for tests.
///
/// A single long-lived connection keeps the in-memory database alive for
/// the lifetime of the pool.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema bootstrap fails.
pub async fn connect_memory() -> Result<Database> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
