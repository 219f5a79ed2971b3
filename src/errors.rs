//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Classification of a chat gateway failure.
///
/// Drives the recovery policy: channel-related failures archive tasks and
/// deactivate configs, transient failures are retried on the next tick or
/// webhook, fatal failures are logged and the current action is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    /// The channel is gone or the bot lost access to it.
    ChannelRelated,
    /// Network blip, timeout, rate limit, or 5xx from the chat service.
    Transient,
    /// Anything else.
    Fatal,
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Chat API failure, pre-classified by the gateway.
    Chat {
        /// Recovery classification.
        kind: ChatErrorKind,
        /// Human-readable detail (usually the Slack error code).
        message: String,
    },
    /// Malformed payload or bad input.
    Validation(String),
    /// Signature verification failed.
    Unauthorized(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Shorthand for a chat failure of the given kind.
    pub fn chat(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self::Chat {
            kind,
            message: message.into(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Chat { kind, message } => write!(f, "chat ({kind:?}): {message}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("invalid json: {err}"))
    }
}

/// Classify an error for the channel-loss / retry policy.
///
/// Non-chat errors are never channel-related; store failures count as
/// fatal for the action at hand.
#[must_use]
pub fn classify_error(err: &AppError) -> ChatErrorKind {
    match err {
        AppError::Chat { kind, .. } => *kind,
        AppError::Io(_) => ChatErrorKind::Transient,
        _ => ChatErrorKind::Fatal,
    }
}

/// Map a Slack Web API error code onto a [`ChatErrorKind`].
#[must_use]
pub fn classify_slack_code(code: &str) -> ChatErrorKind {
    match code {
        "not_in_channel" | "channel_not_found" | "is_archived" | "missing_scope" => {
            ChatErrorKind::ChannelRelated
        }
        "ratelimited" | "internal_error" | "service_unavailable" | "request_timeout"
        | "fatal_error" => ChatErrorKind::Transient,
        _ => ChatErrorKind::Fatal,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
