//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE ... IF NOT EXISTS`, so the bootstrap is
//! safe to re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table and index definitions to the connected database.
///
/// The partial unique index on `review_task` enforces at most one task per
/// `(chat_channel, repo, pr_number)` among `pending`, `in_review`,
/// `snoozed` and `waiting_business_hours`.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS channel_config (
    id                    TEXT PRIMARY KEY NOT NULL,
    channel_id            TEXT NOT NULL,
    label_expression      TEXT NOT NULL DEFAULT '',
    default_mention       TEXT NOT NULL DEFAULT '',
    reviewer_pool         TEXT NOT NULL DEFAULT '[]',
    repository_filter     TEXT NOT NULL DEFAULT '[]',
    business_hours_start  TEXT NOT NULL DEFAULT '',
    business_hours_end    TEXT NOT NULL DEFAULT '',
    timezone              TEXT NOT NULL DEFAULT 'Asia/Tokyo',
    reminder_interval     INTEGER NOT NULL DEFAULT 30,
    active                INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_task (
    id                     TEXT PRIMARY KEY NOT NULL,
    pr_url                 TEXT NOT NULL,
    repo                   TEXT NOT NULL,
    pr_number              INTEGER NOT NULL,
    title                  TEXT NOT NULL DEFAULT '',
    chat_ts                TEXT NOT NULL,
    chat_channel           TEXT NOT NULL,
    reviewer               TEXT NOT NULL DEFAULT '',
    status                 TEXT NOT NULL CHECK(status IN ('pending','in_review','waiting_business_hours','snoozed','watching','completed','archived')),
    label_expression       TEXT NOT NULL DEFAULT '',
    watching_until         TEXT,
    reminder_paused_until  TEXT,
    out_of_hours_reminded  INTEGER NOT NULL DEFAULT 0,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_channel_config_active
    ON channel_config(channel_id, label_expression) WHERE active = 1;
CREATE INDEX IF NOT EXISTS idx_channel_config_channel ON channel_config(channel_id);

CREATE UNIQUE INDEX IF NOT EXISTS idx_review_task_active_pr
    ON review_task(chat_channel, repo, pr_number)
    WHERE status IN ('pending','in_review','snoozed','waiting_business_hours');
CREATE INDEX IF NOT EXISTS idx_review_task_message ON review_task(chat_channel, chat_ts);
CREATE INDEX IF NOT EXISTS idx_review_task_pr ON review_task(repo, pr_number);
CREATE INDEX IF NOT EXISTS idx_review_task_status ON review_task(status, updated_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
