//! Per-(channel, label expression) notification configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label expression used when a channel never named one.
pub const DEFAULT_LABEL_EXPRESSION: &str = "needs-review";

/// Zone assumed when a config names none.
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

/// Reminder interval, in minutes, for freshly created configs.
pub const DEFAULT_REMINDER_INTERVAL_MINUTES: i64 = 30;

/// Longest accepted reminder interval: one week.
pub const MAX_REMINDER_INTERVAL_MINUTES: i64 = 7 * 24 * 60;

/// Notification settings for one label expression in one chat channel.
///
/// `channel_id` alone is not unique; the active index is
/// `(channel_id, label_expression)` among active rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// Unique record identifier.
    pub id: String,
    /// Slack channel the notifications go to.
    pub channel_id: String,
    /// Comma-separated label names, AND-ed together.
    pub label_expression: String,
    /// Slack user mentioned when the reviewer pool is empty.
    pub default_mention: String,
    /// Candidate reviewers, in insertion order.
    pub reviewer_pool: Vec<String>,
    /// `owner/repo` entries; empty means every repository.
    pub repository_filter: Vec<String>,
    /// Local `HH:MM` start of the working window; empty disables gating.
    pub business_hours_start: String,
    /// Local `HH:MM` end of the working window; empty disables gating.
    pub business_hours_end: String,
    /// IANA zone for the working window.
    pub timezone: String,
    /// Minutes between reminders.
    pub reminder_interval: i64,
    /// Whether the config participates in routing.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ChannelConfig {
    /// Construct a config with the defaults used for implicit creation.
    #[must_use]
    pub fn new(channel_id: String, label_expression: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id,
            label_expression,
            default_mention: String::new(),
            reviewer_pool: Vec::new(),
            repository_filter: Vec::new(),
            business_hours_start: "10:00".into(),
            business_hours_end: "19:00".into(),
            timezone: DEFAULT_TIMEZONE.into(),
            reminder_interval: DEFAULT_REMINDER_INTERVAL_MINUTES,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a PR in `repo_full_name` is in scope for this config.
    #[must_use]
    pub fn accepts_repository(&self, repo_full_name: &str) -> bool {
        self.repository_filter.is_empty()
            || self
                .repository_filter
                .iter()
                .any(|r| r.eq_ignore_ascii_case(repo_full_name))
    }

    /// Whether business-hours gating is configured at all.
    #[must_use]
    pub fn has_business_hours(&self) -> bool {
        !self.business_hours_start.trim().is_empty() && !self.business_hours_end.trim().is_empty()
    }
}
