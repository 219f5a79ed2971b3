//! Review task model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, Result};

/// Lifecycle status for a review task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Posted without a reviewer, or taken through the legacy "take" button.
    Pending,
    /// Reviewer assigned; reminders run.
    InReview,
    /// Posted outside business hours without a mention; reviewer deferred.
    WaitingBusinessHours,
    /// Reminders stopped by a user.
    Snoozed,
    /// A reviewer declared they are looking; see `watching_until`.
    Watching,
    /// Terminal success.
    Completed,
    /// Terminal because the chat channel is gone.
    Archived,
}

impl TaskStatus {
    /// Statuses covered by the one-active-task-per-(channel, PR) rule.
    pub const UNIQUE_ACTIVE: [Self; 4] = [
        Self::Pending,
        Self::InReview,
        Self::Snoozed,
        Self::WaitingBusinessHours,
    ];

    /// Database / wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::WaitingBusinessHours => "waiting_business_hours",
            Self::Snoozed => "snoozed",
            Self::Watching => "watching",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    /// Parse the database representation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for unknown status strings.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(Self::Pending),
            "in_review" => Ok(Self::InReview),
            "waiting_business_hours" => Ok(Self::WaitingBusinessHours),
            "snoozed" => Ok(Self::Snoozed),
            "watching" => Ok(Self::Watching),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::Db(format!("invalid task status: {other}"))),
        }
    }

    /// `completed` and `archived` never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

/// A pull request awaiting review in one chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReviewTask {
    /// Unique record identifier.
    pub id: String,
    /// HTML URL of the pull request.
    pub pr_url: String,
    /// `owner/repo`.
    pub repo: String,
    /// Pull request number.
    pub pr_number: i64,
    /// Pull request title at posting time.
    pub title: String,
    /// Root message timestamp; thread root and update key.
    pub chat_ts: String,
    /// Channel the root message lives in.
    pub chat_channel: String,
    /// Assigned Slack user; empty when unassigned.
    pub reviewer: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Label expression of the config that produced the task.
    pub label_expression: String,
    /// End of the watch window.
    pub watching_until: Option<DateTime<Utc>>,
    /// Reminders are suppressed until this instant.
    pub reminder_paused_until: Option<DateTime<Utc>>,
    /// Latch set once an out-of-hours reminder has gone out.
    pub out_of_hours_reminded: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification; doubles as "last reminded" for the scheduler.
    pub updated_at: DateTime<Utc>,
}

/// Pull request coordinates and presentation data for a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// HTML URL.
    pub url: String,
    /// `owner/repo`.
    pub repo: String,
    /// Number.
    pub number: i64,
    /// Title.
    pub title: String,
}

impl ReviewTask {
    /// Construct a task for a freshly posted root message.
    #[must_use]
    pub fn new(
        pr: &PullRequestRef,
        chat_channel: String,
        chat_ts: String,
        label_expression: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pr_url: pr.url.clone(),
            repo: pr.repo.clone(),
            pr_number: pr.number,
            title: pr.title.clone(),
            chat_ts,
            chat_channel,
            reviewer: String::new(),
            status: TaskStatus::Pending,
            label_expression,
            watching_until: None,
            reminder_paused_until: None,
            out_of_hours_reminded: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether reminders are suppressed at `now`.
    #[must_use]
    pub fn is_paused_at(&self, now: DateTime<Utc>) -> bool {
        self.reminder_paused_until.is_some_and(|until| until > now)
    }
}
