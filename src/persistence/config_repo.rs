//! Channel configuration repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::ChannelConfig;
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

/// Repository wrapper around `SQLite` for channel configuration records.
#[derive(Clone)]
pub struct ConfigRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ChannelConfigRow {
    id: String,
    channel_id: String,
    label_expression: String,
    default_mention: String,
    reviewer_pool: String,
    repository_filter: String,
    business_hours_start: String,
    business_hours_end: String,
    timezone: String,
    reminder_interval: i64,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl ChannelConfigRow {
    /// Convert a database row into the domain model.
    fn into_config(self) -> Result<ChannelConfig> {
        let reviewer_pool: Vec<String> = serde_json::from_str(&self.reviewer_pool)
            .map_err(|e| AppError::Db(format!("invalid reviewer_pool: {e}")))?;
        let repository_filter: Vec<String> = serde_json::from_str(&self.repository_filter)
            .map_err(|e| AppError::Db(format!("invalid repository_filter: {e}")))?;

        Ok(ChannelConfig {
            id: self.id,
            channel_id: self.channel_id,
            label_expression: self.label_expression,
            default_mention: self.default_mention,
            reviewer_pool,
            repository_filter,
            business_hours_start: self.business_hours_start,
            business_hours_end: self.business_hours_end,
            timezone: self.timezone,
            reminder_interval: self.reminder_interval,
            active: self.active,
            created_at: decode_ts("created_at", &self.created_at)?,
            updated_at: decode_ts("updated_at", &self.updated_at)?,
        })
    }
}

fn into_configs(rows: Vec<ChannelConfigRow>) -> Result<Vec<ChannelConfig>> {
    rows.into_iter().map(ChannelConfigRow::into_config).collect()
}

impl ConfigRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve a config by its ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ChannelConfig>> {
        let row: Option<ChannelConfigRow> =
            sqlx::query_as("SELECT * FROM channel_config WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ChannelConfigRow::into_config).transpose()
    }

    /// The channel's primary config: active rows first, then oldest.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_channel(&self, channel_id: &str) -> Result<Option<ChannelConfig>> {
        let row: Option<ChannelConfigRow> = sqlx::query_as(
            "SELECT * FROM channel_config WHERE channel_id = ?1 \
             ORDER BY active DESC, created_at ASC, id ASC LIMIT 1",
        )
        .bind(channel_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ChannelConfigRow::into_config).transpose()
    }

    /// Exact lookup on `(channel_id, label_expression)`; active rows win.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_channel_and_label(
        &self,
        channel_id: &str,
        label_expression: &str,
    ) -> Result<Option<ChannelConfig>> {
        let row: Option<ChannelConfigRow> = sqlx::query_as(
            "SELECT * FROM channel_config WHERE channel_id = ?1 AND label_expression = ?2 \
             ORDER BY active DESC, updated_at DESC LIMIT 1",
        )
        .bind(channel_id)
        .bind(label_expression)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ChannelConfigRow::into_config).transpose()
    }

    /// Every config of a channel, active or not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_channel(&self, channel_id: &str) -> Result<Vec<ChannelConfig>> {
        let rows: Vec<ChannelConfigRow> = sqlx::query_as(
            "SELECT * FROM channel_config WHERE channel_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(channel_id)
        .fetch_all(self.db.as_ref())
        .await?;

        into_configs(rows)
    }

    /// Active configs of a channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_active_by_channel(&self, channel_id: &str) -> Result<Vec<ChannelConfig>> {
        let rows: Vec<ChannelConfigRow> = sqlx::query_as(
            "SELECT * FROM channel_config WHERE channel_id = ?1 AND active = 1 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(channel_id)
        .fetch_all(self.db.as_ref())
        .await?;

        into_configs(rows)
    }

    /// Every active config, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_all_active(&self) -> Result<Vec<ChannelConfig>> {
        let rows: Vec<ChannelConfigRow> = sqlx::query_as(
            "SELECT * FROM channel_config WHERE active = 1 ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        into_configs(rows)
    }

    /// Insert or fully replace a config record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails, including when activating
    /// a config whose `(channel_id, label_expression)` is already active.
    pub async fn upsert(&self, cfg: &ChannelConfig) -> Result<ChannelConfig> {
        let reviewer_pool = serde_json::to_string(&cfg.reviewer_pool)
            .map_err(|e| AppError::Db(format!("serialize reviewer_pool: {e}")))?;
        let repository_filter = serde_json::to_string(&cfg.repository_filter)
            .map_err(|e| AppError::Db(format!("serialize repository_filter: {e}")))?;

        sqlx::query(
            "INSERT INTO channel_config (id, channel_id, label_expression, default_mention,
             reviewer_pool, repository_filter, business_hours_start, business_hours_end,
             timezone, reminder_interval, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                channel_id = excluded.channel_id,
                label_expression = excluded.label_expression,
                default_mention = excluded.default_mention,
                reviewer_pool = excluded.reviewer_pool,
                repository_filter = excluded.repository_filter,
                business_hours_start = excluded.business_hours_start,
                business_hours_end = excluded.business_hours_end,
                timezone = excluded.timezone,
                reminder_interval = excluded.reminder_interval,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&cfg.id)
        .bind(&cfg.channel_id)
        .bind(&cfg.label_expression)
        .bind(&cfg.default_mention)
        .bind(&reviewer_pool)
        .bind(&repository_filter)
        .bind(&cfg.business_hours_start)
        .bind(&cfg.business_hours_end)
        .bind(&cfg.timezone)
        .bind(cfg.reminder_interval)
        .bind(cfg.active)
        .bind(encode_ts(cfg.created_at))
        .bind(encode_ts(cfg.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(cfg.clone())
    }

    /// Mark a config inactive. Never deletes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn deactivate(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE channel_config SET active = 0, updated_at = ?1 WHERE id = ?2")
            .bind(encode_ts(now))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Mark every active config of a channel inactive; returns how many.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn deactivate_channel(&self, channel_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE channel_config SET active = 0, updated_at = ?1 \
             WHERE channel_id = ?2 AND active = 1",
        )
        .bind(encode_ts(now))
        .bind(channel_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected())
    }
}
