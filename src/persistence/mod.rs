//! Persistence layer modules.

pub mod config_repo;
pub mod db;
pub mod schema;
pub mod task_repo;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Encode an instant in the fixed-width form stored in every timestamp
/// column, so that string comparison in SQL matches instant ordering.
pub(crate) fn encode_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

pub(crate) fn decode_opt_ts(column: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| decode_ts(column, value)).transpose()
}
