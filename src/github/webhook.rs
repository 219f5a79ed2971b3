//! Webhook payloads, signature verification, and event dispatch.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info};

use crate::models::PullRequestRef;
use crate::state::AppState;
use crate::{AppError, Result};

use super::{label_handler, review_handler};

type HmacSha256 = Hmac<Sha256>;

/// A label on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
}

/// GitHub account reference.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Login handle.
    pub login: String,
    /// Display name, when the payload carries one.
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    /// Display name, falling back to the login.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.login)
    }
}

/// Repository reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    /// Short name.
    pub name: String,
    /// `owner/name`.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Owner account.
    pub owner: User,
}

impl Repository {
    /// `owner/name`, derived when `full_name` is absent.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.full_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}/{}", self.owner.login, self.name))
    }
}

/// Pull request as carried by `pull_request` and review events.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    /// Number.
    pub number: i64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// HTML URL.
    pub html_url: String,
    /// Labels after the event was applied.
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl PullRequest {
    /// Label names.
    #[must_use]
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Coordinates used by the task store.
    #[must_use]
    pub fn to_ref(&self, repo_full_name: &str) -> PullRequestRef {
        PullRequestRef {
            url: self.html_url.clone(),
            repo: repo_full_name.to_owned(),
            number: self.number,
            title: self.title.clone(),
        }
    }
}

/// `pull_request` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    /// Action, e.g. `labeled`.
    pub action: String,
    /// Label added or removed.
    #[serde(default)]
    pub label: Option<Label>,
    /// Pull request.
    pub pull_request: PullRequest,
    /// Repository.
    pub repository: Repository,
}

/// A submitted review.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    /// `approved`, `changes_requested`, `commented`, ...
    pub state: String,
    /// Author.
    pub user: User,
}

/// `pull_request_review` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestReviewEvent {
    /// Action, e.g. `submitted`.
    pub action: String,
    /// Review.
    pub review: Review,
    /// Pull request.
    pub pull_request: PullRequest,
    /// Repository.
    pub repository: Repository,
}

/// Decoded delivery.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    /// Connectivity check.
    Ping,
    /// `pull_request`.
    PullRequest(Box<PullRequestEvent>),
    /// `pull_request_review`.
    Review(Box<PullRequestReviewEvent>),
    /// Anything the coordinator does not consume.
    Ignored(String),
}

impl WebhookEvent {
    /// Decode a delivery by its `X-GitHub-Event` header.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the body does not match the event.
    pub fn parse(event_type: &str, body: &[u8]) -> Result<Self> {
        Ok(match event_type {
            "ping" => Self::Ping,
            "pull_request" => Self::PullRequest(Box::new(serde_json::from_slice(body)?)),
            "pull_request_review" => Self::Review(Box::new(serde_json::from_slice(body)?)),
            other => Self::Ignored(other.to_owned()),
        })
    }
}

/// Verify `X-Hub-Signature-256` (`sha256=<hex>`) over the raw body.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the header is missing, malformed,
/// or does not match.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<()> {
    let header = header.ok_or_else(|| AppError::Unauthorized("missing signature".into()))?;
    let expected = header
        .strip_prefix("sha256=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| AppError::Unauthorized("malformed signature".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AppError::Config(format!("invalid webhook secret: {err}")))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| AppError::Unauthorized("signature mismatch".into()))
}

/// Apply one decoded delivery. Fan-out failures are logged by the
/// handlers; only store failures outside the per-config loop surface here.
///
/// # Errors
///
/// Returns `AppError::Db` if the initial config or task lookup fails.
pub async fn handle_delivery(state: &AppState, event: WebhookEvent) -> Result<()> {
    match event {
        WebhookEvent::Ping => {
            info!("github ping");
            Ok(())
        }
        WebhookEvent::PullRequest(event) => {
            if event.label.is_none() {
                debug!(action = %event.action, "pull_request event without label");
                return Ok(());
            }
            match event.action.as_str() {
                "labeled" => label_handler::handle_labeled(state, &event).await,
                "unlabeled" => label_handler::handle_unlabeled(state, &event).await,
                other => {
                    debug!(action = other, "ignoring pull_request action");
                    Ok(())
                }
            }
        }
        WebhookEvent::Review(event) => {
            if event.action == "submitted" {
                review_handler::handle_review_submitted(state, &event).await
            } else {
                debug!(action = %event.action, "ignoring review action");
                Ok(())
            }
        }
        WebhookEvent::Ignored(kind) => {
            debug!(event = %kind, "ignoring github event");
            Ok(())
        }
    }
}
