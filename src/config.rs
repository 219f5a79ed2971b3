//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::warn;

use crate::models::channel_config::MAX_REMINDER_INTERVAL_MINUTES;
use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
const KEYRING_SERVICE: &str = "review-herald";

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct HttpConfig {
    /// Address the listener binds to.
    pub bind_address: IpAddr,
    /// TCP port for the webhook and Slack endpoints.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
        }
    }
}

/// `SQLite` store settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("review-herald.db"),
            max_connections: 5,
            busy_timeout_seconds: 30,
        }
    }
}

/// Slack connectivity settings.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SlackConfig {
    /// Per-call timeout for Slack Web API requests.
    pub request_timeout_seconds: u64,
    /// When set, every chat primitive succeeds without network I/O.
    pub test_mode: bool,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
    /// Signing secret for inbound Slack requests (populated at runtime).
    #[serde(skip)]
    pub signing_secret: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 10,
            test_mode: false,
            bot_token: String::new(),
            signing_secret: None,
        }
    }
}

/// GitHub webhook settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GitHubConfig {
    /// Shared HMAC secret for `X-Hub-Signature-256` (populated at runtime).
    #[serde(skip)]
    pub webhook_secret: String,
}

/// Reminder scheduler settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ReminderConfig {
    /// Period between scheduler ticks.
    pub tick_seconds: u64,
    /// Reminder interval used when a task has no matching config.
    pub default_interval_minutes: i64,
    /// Length of the watch window set by the "watching" button.
    pub watch_hours: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 60,
            default_interval_minutes: 30,
            watch_hours: 2,
        }
    }
}

/// Janitor (channel liveness + retention) settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct JanitorConfig {
    /// Period between janitor sweeps.
    pub tick_seconds: u64,
    /// Age after which `completed` / `archived` tasks are purged.
    pub terminal_retention_hours: i64,
    /// Age after which `snoozed` tasks are purged.
    pub snoozed_retention_days: i64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 3600,
            terminal_retention_hours: 24,
            snoozed_retention_days: 14,
        }
    }
}

/// Calendar defaults shared by every channel.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CalendarConfig {
    /// Zone used when a channel config names none or an unknown one.
    pub default_timezone: String,
    /// Additional non-business days (`YYYY-MM-DD`) applied in every zone.
    pub extra_holidays: Vec<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_timezone: "Asia/Tokyo".into(),
            extra_holidays: Vec::new(),
        }
    }
}

impl CalendarConfig {
    /// Parsed default zone; falls back to `Asia/Tokyo`.
    #[must_use]
    pub fn default_tz(&self) -> Tz {
        self.default_timezone.parse().unwrap_or(Tz::Asia__Tokyo)
    }

    /// Parsed extra holiday dates. Malformed entries are skipped.
    #[must_use]
    pub fn extra_holiday_dates(&self) -> Vec<NaiveDate> {
        self.extra_holidays
            .iter()
            .filter_map(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
            .collect()
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// HTTP listener.
    pub http: HttpConfig,
    /// Durable store.
    pub database: DatabaseConfig,
    /// Slack client.
    pub slack: SlackConfig,
    /// GitHub webhook.
    pub github: GitHubConfig,
    /// Reminder scheduler.
    pub reminder: ReminderConfig,
    /// Janitor.
    pub janitor: JanitorConfig,
    /// Business calendar defaults.
    pub calendar: CalendarConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `REVIEW_HERALD_DB_PATH` / `REVIEW_HERALD_PORT` overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the port override is not a number.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var("REVIEW_HERALD_DB_PATH") {
            if !path.is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
        if let Ok(port) = env::var("REVIEW_HERALD_PORT") {
            self.http.port = port
                .parse()
                .map_err(|err| AppError::Config(format!("invalid REVIEW_HERALD_PORT: {err}")))?;
        }
        Ok(())
    }

    /// Load credentials from OS keychain with env-var fallback.
    ///
    /// The Slack bot token is not required in `test_mode`. The Slack signing
    /// secret is optional; when absent, `/slack/*` requests are not verified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required credential is missing.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.github.webhook_secret =
            load_credential("github_webhook_secret", "GITHUB_WEBHOOK_SECRET").await?;

        match load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await {
            Ok(token) => self.slack.bot_token = token,
            Err(err) if self.slack.test_mode => {
                warn!(%err, "no slack bot token; test mode keeps the gateway offline");
            }
            Err(err) => return Err(err),
        }

        self.slack.signing_secret = load_credential("slack_signing_secret", "SLACK_SIGNING_SECRET")
            .await
            .ok();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.reminder.tick_seconds == 0 {
            return Err(AppError::Config(
                "reminder.tick_seconds must be greater than zero".into(),
            ));
        }
        let interval = self.reminder.default_interval_minutes;
        if !(1..=MAX_REMINDER_INTERVAL_MINUTES).contains(&interval) {
            return Err(AppError::Config(format!(
                "reminder.default_interval_minutes must be between 1 and {MAX_REMINDER_INTERVAL_MINUTES}"
            )));
        }
        if self.reminder.watch_hours <= 0 {
            return Err(AppError::Config(
                "reminder.watch_hours must be greater than zero".into(),
            ));
        }
        if self.janitor.tick_seconds == 0 {
            return Err(AppError::Config(
                "janitor.tick_seconds must be greater than zero".into(),
            ));
        }
        if self.janitor.terminal_retention_hours <= 0 || self.janitor.snoozed_retention_days <= 0 {
            return Err(AppError::Config(
                "janitor retention windows must be greater than zero".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "database.max_connections must be greater than zero".into(),
            ));
        }
        if self.calendar.default_timezone.parse::<Tz>().is_err() {
            return Err(AppError::Config(format!(
                "calendar.default_timezone '{}' is not an IANA zone",
                self.calendar.default_timezone
            )));
        }
        for raw in &self.calendar.extra_holidays {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
                AppError::Config(format!("calendar.extra_holidays entry '{raw}': {err}"))
            })?;
        }
        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            tracing::debug!(key = keyring_key, ?err, "keychain lookup failed, trying env var");
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
