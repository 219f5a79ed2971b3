//! Review task repository for `SQLite` persistence.
//!
//! Every mutation is a single-row write, except task creation which runs
//! inside an exclusive transaction (see [`TaskCreationTx`]) so that
//! concurrent webhook deliveries for the same pull request serialise on
//! the select-then-insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection};
use tracing::warn;

use crate::models::{ReviewTask, TaskStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_opt_ts, decode_ts, encode_ts};

/// SQL `IN` list of the statuses covered by the uniqueness rule.
fn unique_active_sql() -> String {
    let quoted: Vec<String> = TaskStatus::UNIQUE_ACTIVE
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect();
    format!("({})", quoted.join(","))
}

/// SQL list literal of the terminal statuses.
const TERMINAL_SQL: &str = "('completed','archived')";

/// Repository wrapper around `SQLite` for review task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ReviewTaskRow {
    id: String,
    pr_url: String,
    repo: String,
    pr_number: i64,
    title: String,
    chat_ts: String,
    chat_channel: String,
    reviewer: String,
    status: String,
    label_expression: String,
    watching_until: Option<String>,
    reminder_paused_until: Option<String>,
    out_of_hours_reminded: bool,
    created_at: String,
    updated_at: String,
}

impl ReviewTaskRow {
    /// Convert a database row into the domain model.
    fn into_task(self) -> Result<ReviewTask> {
        Ok(ReviewTask {
            status: TaskStatus::parse(&self.status)?,
            watching_until: decode_opt_ts("watching_until", self.watching_until.as_deref())?,
            reminder_paused_until: decode_opt_ts(
                "reminder_paused_until",
                self.reminder_paused_until.as_deref(),
            )?,
            created_at: decode_ts("created_at", &self.created_at)?,
            updated_at: decode_ts("updated_at", &self.updated_at)?,
            id: self.id,
            pr_url: self.pr_url,
            repo: self.repo,
            pr_number: self.pr_number,
            title: self.title,
            chat_ts: self.chat_ts,
            chat_channel: self.chat_channel,
            reviewer: self.reviewer,
            label_expression: self.label_expression,
            out_of_hours_reminded: self.out_of_hours_reminded,
        })
    }
}

fn into_tasks(rows: Vec<ReviewTaskRow>) -> Result<Vec<ReviewTask>> {
    rows.into_iter().map(ReviewTaskRow::into_task).collect()
}

async fn insert_task(conn: &mut SqliteConnection, task: &ReviewTask) -> Result<()> {
    sqlx::query(
        "INSERT INTO review_task (id, pr_url, repo, pr_number, title, chat_ts, chat_channel,
         reviewer, status, label_expression, watching_until, reminder_paused_until,
         out_of_hours_reminded, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )
    .bind(&task.id)
    .bind(&task.pr_url)
    .bind(&task.repo)
    .bind(task.pr_number)
    .bind(&task.title)
    .bind(&task.chat_ts)
    .bind(&task.chat_channel)
    .bind(&task.reviewer)
    .bind(task.status.as_str())
    .bind(&task.label_expression)
    .bind(task.watching_until.map(encode_ts))
    .bind(task.reminder_paused_until.map(encode_ts))
    .bind(task.out_of_hours_reminded)
    .bind(encode_ts(task.created_at))
    .bind(encode_ts(task.updated_at))
    .execute(conn)
    .await?;

    Ok(())
}

async fn has_unique_active(
    conn: &mut SqliteConnection,
    chat_channel: &str,
    repo: &str,
    pr_number: i64,
) -> Result<bool> {
    let query = format!(
        "SELECT COUNT(*) FROM review_task \
         WHERE chat_channel = ?1 AND repo = ?2 AND pr_number = ?3 AND status IN {}",
        unique_active_sql()
    );
    let count: i64 = sqlx::query_scalar(&query)
        .bind(chat_channel)
        .bind(repo)
        .bind(pr_number)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a task outside of any creation transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails, including a violation of
    /// the one-active-task-per-(channel, PR) index.
    pub async fn create(&self, task: &ReviewTask) -> Result<ReviewTask> {
        let mut conn = self.db.acquire().await?;
        insert_task(&mut conn, task).await?;
        Ok(task.clone())
    }

    /// Open an exclusive creation transaction.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so a concurrent
    /// creator blocks (up to the busy timeout) until this one commits and
    /// then observes its row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the lock cannot be taken.
    pub async fn begin_creation(&self) -> Result<TaskCreationTx> {
        let mut conn = self.db.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(TaskCreationTx { conn: Some(conn) })
    }

    /// Retrieve a task by its ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ReviewTask>> {
        let row: Option<ReviewTaskRow> = sqlx::query_as("SELECT * FROM review_task WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(ReviewTaskRow::into_task).transpose()
    }

    /// Resolve a task by its root chat message; the newest wins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_message(&self, chat_channel: &str, chat_ts: &str) -> Result<Option<ReviewTask>> {
        let row: Option<ReviewTaskRow> = sqlx::query_as(
            "SELECT * FROM review_task WHERE chat_channel = ?1 AND chat_ts = ?2 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(chat_channel)
        .bind(chat_ts)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(ReviewTaskRow::into_task).transpose()
    }

    /// Non-terminal tasks for a pull request across every channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_active_by_pr(&self, repo: &str, pr_number: i64) -> Result<Vec<ReviewTask>> {
        let query = format!(
            "SELECT * FROM review_task WHERE repo = ?1 AND pr_number = ?2 \
             AND status NOT IN {TERMINAL_SQL} ORDER BY created_at ASC, id ASC"
        );
        let rows: Vec<ReviewTaskRow> = sqlx::query_as(&query)
            .bind(repo)
            .bind(pr_number)
            .fetch_all(self.db.as_ref())
            .await?;

        into_tasks(rows)
    }

    /// Tasks for a pull request whose status is one of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_pr_and_status(
        &self,
        repo: &str,
        pr_number: i64,
        statuses: &[TaskStatus],
    ) -> Result<Vec<ReviewTask>> {
        let tasks = self.find_all_by_pr(repo, pr_number).await?;
        Ok(tasks
            .into_iter()
            .filter(|task| statuses.contains(&task.status))
            .collect())
    }

    /// Every task for a pull request, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_all_by_pr(&self, repo: &str, pr_number: i64) -> Result<Vec<ReviewTask>> {
        let rows: Vec<ReviewTaskRow> = sqlx::query_as(
            "SELECT * FROM review_task WHERE repo = ?1 AND pr_number = ?2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(repo)
        .bind(pr_number)
        .fetch_all(self.db.as_ref())
        .await?;

        into_tasks(rows)
    }

    /// Tasks in a given status, least recently touched first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<ReviewTask>> {
        let rows: Vec<ReviewTaskRow> = sqlx::query_as(
            "SELECT * FROM review_task WHERE status = ?1 ORDER BY updated_at ASC, id ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.db.as_ref())
        .await?;

        into_tasks(rows)
    }

    /// Whether a task other than `exclude_id` holds the active slot for
    /// `(chat_channel, repo, pr_number)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn has_other_active(
        &self,
        chat_channel: &str,
        repo: &str,
        pr_number: i64,
        exclude_id: &str,
    ) -> Result<bool> {
        let query = format!(
            "SELECT COUNT(*) FROM review_task WHERE chat_channel = ?1 AND repo = ?2 \
             AND pr_number = ?3 AND id <> ?4 AND status IN {}",
            unique_active_sql()
        );
        let count: i64 = sqlx::query_scalar(&query)
            .bind(chat_channel)
            .bind(repo)
            .bind(pr_number)
            .bind(exclude_id)
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    /// Persist every mutable field of a task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the row does not exist, or
    /// `AppError::Db` if the update fails.
    pub async fn update(&self, task: &ReviewTask) -> Result<()> {
        let result = sqlx::query(
            "UPDATE review_task SET title = ?1, chat_ts = ?2, reviewer = ?3, status = ?4,
             label_expression = ?5, watching_until = ?6, reminder_paused_until = ?7,
             out_of_hours_reminded = ?8, updated_at = ?9
             WHERE id = ?10",
        )
        .bind(&task.title)
        .bind(&task.chat_ts)
        .bind(&task.reviewer)
        .bind(task.status.as_str())
        .bind(&task.label_expression)
        .bind(task.watching_until.map(encode_ts))
        .bind(task.reminder_paused_until.map(encode_ts))
        .bind(task.out_of_hours_reminded)
        .bind(encode_ts(task.updated_at))
        .bind(&task.id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("review task {}", task.id)));
        }
        Ok(())
    }

    /// Move a task to `completed` unless it is already terminal.
    ///
    /// Returns `true` only for the call that performed the transition.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn complete(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, TaskStatus::Completed, now).await
    }

    /// Move a task to `archived` unless it is already terminal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn archive(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.finish(id, TaskStatus::Archived, now).await
    }

    async fn finish(&self, id: &str, status: TaskStatus, now: DateTime<Utc>) -> Result<bool> {
        let query = format!(
            "UPDATE review_task SET status = ?1, updated_at = ?2 \
             WHERE id = ?3 AND status NOT IN {TERMINAL_SQL}"
        );
        let result = sqlx::query(&query)
            .bind(status.as_str())
            .bind(encode_ts(now))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Archive every non-terminal task posted in a channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn archive_channel(&self, chat_channel: &str, now: DateTime<Utc>) -> Result<u64> {
        let query = format!(
            "UPDATE review_task SET status = 'archived', updated_at = ?1 \
             WHERE chat_channel = ?2 AND status NOT IN {TERMINAL_SQL}"
        );
        let result = sqlx::query(&query)
            .bind(encode_ts(now))
            .bind(chat_channel)
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete terminal tasks untouched since `terminal_cutoff` and snoozed
    /// tasks untouched since `snoozed_cutoff`; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge(
        &self,
        terminal_cutoff: DateTime<Utc>,
        snoozed_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let query = format!(
            "DELETE FROM review_task WHERE \
             (status IN {TERMINAL_SQL} AND updated_at < ?1) \
             OR (status = 'snoozed' AND updated_at < ?2)"
        );
        let result = sqlx::query(&query)
            .bind(encode_ts(terminal_cutoff))
            .bind(encode_ts(snoozed_cutoff))
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

/// Exclusive transaction guarding the select-then-insert of a new task.
///
/// Dropping the guard without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls back in the background.
pub struct TaskCreationTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl TaskCreationTx {
    fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::Db("creation transaction already finished".into()))
    }

    /// Whether `(chat_channel, repo, pr_number)` already has an active task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn has_active_task(
        &mut self,
        chat_channel: &str,
        repo: &str,
        pr_number: i64,
    ) -> Result<bool> {
        has_unique_active(self.conn()?, chat_channel, repo, pr_number).await
    }

    /// Insert the new task inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&mut self, task: &ReviewTask) -> Result<()> {
        insert_task(self.conn()?, task).await
    }

    /// Commit and release the write lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the commit fails.
    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| AppError::Db("creation transaction already finished".into()))?;
        sqlx::query("COMMIT").execute(&mut *conn).await?;
        Ok(())
    }

    /// Roll back and release the write lock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the rollback fails.
    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| AppError::Db("creation transaction already finished".into()))?;
        sqlx::query("ROLLBACK").execute(&mut *conn).await?;
        Ok(())
    }
}

impl Drop for TaskCreationTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!(%err, "background rollback of abandoned creation failed");
                }
            });
        } else {
            conn.close_on_drop();
        }
    }
}
