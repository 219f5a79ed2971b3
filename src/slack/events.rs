//! Slack interaction and Events API dispatch.
//!
//! Interaction payloads arrive url-encoded in a `payload` field. The task
//! is resolved from the message the control lives on; controls posted in
//! a thread carry the task id in their value, which is used when the
//! message is not a task's root. Dispatch is by `action_id` prefix.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::ReviewTask;
use crate::orchestrator::retire_channel;
use crate::slack::blocks::{
    self, ACTION_CHANGE_REVIEWER, ACTION_PAUSE_PREFIX, ACTION_TAKE, ACTION_WATCH,
};
use crate::slack::handlers::{self, pause::PauseSpec};
use crate::state::AppState;
use crate::{AppError, Result};

/// Acting user of an interaction.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadUser {
    /// Slack user id.
    pub id: String,
}

/// Option chosen in a select menu.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedOption {
    /// Option value.
    pub value: String,
}

/// One action of a `block_actions` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadAction {
    /// Control identifier.
    pub action_id: String,
    /// Button value.
    #[serde(default)]
    pub value: Option<String>,
    /// Select menu choice.
    #[serde(default)]
    pub selected_option: Option<SelectedOption>,
}

impl PayloadAction {
    /// Button value or selected option value, whichever is present.
    #[must_use]
    pub fn chosen_value(&self) -> Option<&str> {
        self.value
            .as_deref()
            .or_else(|| self.selected_option.as_ref().map(|o| o.value.as_str()))
    }
}

/// Where the control was clicked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadContainer {
    /// Channel of the message.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Timestamp of the message.
    #[serde(default)]
    pub message_ts: Option<String>,
}

/// Channel reference on the payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadChannel {
    /// Channel id.
    pub id: String,
}

/// Message the control belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadMessage {
    /// Message timestamp.
    pub ts: String,
}

/// Decoded interaction payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InteractionPayload {
    /// Payload type (`block_actions`, `view_submission`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Acting user.
    pub user: PayloadUser,
    /// Actions; `block_actions` carries exactly one in practice.
    #[serde(default)]
    pub actions: Vec<PayloadAction>,
    /// Container of the clicked control.
    #[serde(default)]
    pub container: PayloadContainer,
    /// Channel reference.
    #[serde(default)]
    pub channel: Option<PayloadChannel>,
    /// Message the control is attached to.
    #[serde(default)]
    pub message: Option<PayloadMessage>,
}

impl InteractionPayload {
    /// Decode the JSON carried in the `payload` form field.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the JSON is malformed.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Channel of the clicked message.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.container
            .channel_id
            .as_deref()
            .or_else(|| self.channel.as_ref().map(|c| c.id.as_str()))
    }

    /// Timestamp of the clicked message.
    #[must_use]
    pub fn message_ts(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(|m| m.ts.as_str())
            .or(self.container.message_ts.as_deref())
    }
}

/// A recognised control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Legacy take.
    Take,
    /// Start watching.
    Watch,
    /// Rotate reviewer.
    ChangeReviewer,
    /// Pause reminders.
    Pause(PauseSpec),
}

impl TaskAction {
    /// Decode an action and the task id carried by its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for unknown action ids or malformed
    /// pause values.
    pub fn parse(action_id: &str, value: Option<&str>) -> Result<(Self, Option<String>)> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        if action_id.starts_with(ACTION_PAUSE_PREFIX) {
            let value = value
                .ok_or_else(|| AppError::Validation("pause action without value".into()))?;
            let (task_id, spec) = handlers::pause::parse_pause_value(value)?;
            return Ok((Self::Pause(spec), Some(task_id)));
        }
        let action = match action_id {
            ACTION_TAKE => Self::Take,
            ACTION_WATCH => Self::Watch,
            ACTION_CHANGE_REVIEWER => Self::ChangeReviewer,
            other => return Err(AppError::Validation(format!("unknown action_id: {other}"))),
        };
        Ok((action, value.map(str::to_owned)))
    }
}

async fn resolve_task(
    state: &AppState,
    channel: &str,
    ts: Option<&str>,
    hinted_id: Option<&str>,
) -> Result<ReviewTask> {
    let tasks = state.tasks();
    if let Some(ts) = ts {
        if let Some(task) = tasks.get_by_message(channel, ts).await? {
            return Ok(task);
        }
    }
    if let Some(id) = hinted_id {
        if let Some(task) = tasks.get_by_id(id).await? {
            if task.chat_channel == channel {
                return Ok(task);
            }
            warn!(task_id = id, channel, "control value names a task in another channel");
        }
    }
    Err(AppError::NotFound(format!(
        "no review task for message {} in {channel}",
        ts.unwrap_or("-")
    )))
}

/// Handle a decoded interaction payload.
///
/// # Errors
///
/// `AppError::Validation` for malformed payloads, `AppError::NotFound` when
/// no task matches, and `AppError::Chat` when the root message cannot be
/// updated after the mutation.
pub async fn handle_interaction(state: &AppState, payload: &InteractionPayload) -> Result<()> {
    if payload.kind != "block_actions" {
        debug!(kind = %payload.kind, "ignoring interaction type");
        return Ok(());
    }
    let Some(action) = payload.actions.first() else {
        return Err(AppError::Validation("block_actions without actions".into()));
    };
    let channel = payload
        .channel_id()
        .ok_or_else(|| AppError::Validation("interaction without channel".into()))?;
    let actor = payload.user.id.as_str();

    let (kind, hinted_id) = TaskAction::parse(&action.action_id, action.chosen_value())?;
    info!(action_id = %action.action_id, user = actor, channel, "dispatching block action");

    let task = resolve_task(state, channel, payload.message_ts(), hinted_id.as_deref()).await?;
    if task.status.is_terminal() {
        info!(task_id = %task.id, status = task.status.as_str(), "ignoring action on closed task");
        return Ok(());
    }

    let task = match kind {
        TaskAction::Take => handlers::review::handle_take(state, task, actor).await?,
        TaskAction::Watch => handlers::review::handle_watch(state, task, actor).await?,
        TaskAction::ChangeReviewer => {
            handlers::rotate::handle_change_reviewer(state, task, actor).await?
        }
        TaskAction::Pause(spec) => handlers::pause::handle_pause(state, task, actor, spec).await?,
    };

    let cfg = state
        .configs()
        .get_by_channel_and_label(&task.chat_channel, &task.label_expression)
        .await?;
    let tz = state.calendar.timezone_or_default(cfg.as_ref());
    state
        .chat
        .update_message(&task.chat_channel, &task.chat_ts, blocks::task_blocks(&task, tz))
        .await
        .inspect_err(|err| warn!(%err, task_id = %task.id, "failed to refresh root message"))
}

/// Inner event of an Events API callback.
#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
    /// Event type, e.g. `channel_archive`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Channel reference; a plain id for channel lifecycle events.
    #[serde(default)]
    pub channel: Option<serde_json::Value>,
}

/// Events API envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// `url_verification` or `event_callback`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Verification challenge.
    #[serde(default)]
    pub challenge: Option<String>,
    /// Callback event.
    #[serde(default)]
    pub event: Option<EventBody>,
}

/// Outcome of an Events API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventReply {
    /// Echo this challenge back.
    Challenge(String),
    /// Plain acknowledgement.
    Ack,
}

/// Handle an Events API envelope.
///
/// # Errors
///
/// Returns `AppError::Validation` for a verification request without a
/// challenge. Store failures while retiring a channel are logged, not
/// returned.
pub async fn handle_event(state: &AppState, envelope: EventEnvelope) -> Result<EventReply> {
    match envelope.kind.as_str() {
        "url_verification" => envelope
            .challenge
            .map(EventReply::Challenge)
            .ok_or_else(|| AppError::Validation("url_verification without challenge".into())),
        "event_callback" => {
            let Some(event) = envelope.event else {
                return Ok(EventReply::Ack);
            };
            if event.kind == "channel_archive" || event.kind == "channel_deleted" {
                if let Some(channel) = event.channel.as_ref().and_then(serde_json::Value::as_str) {
                    info!(channel, event = %event.kind, "channel lifecycle event");
                    if let Err(err) = retire_channel(state, channel).await {
                        warn!(%err, channel, "failed to retire archived channel");
                    }
                }
            } else {
                debug!(event = %event.kind, "ignoring event");
            }
            Ok(EventReply::Ack)
        }
        other => {
            debug!(kind = other, "ignoring envelope type");
            Ok(EventReply::Ack)
        }
    }
}
