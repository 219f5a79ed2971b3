//! Pause-reminder buttons.
//!
//! The button value is `<task_id>:<spec>` where spec is `Nh` (1 to 24
//! hours), `today` (until the next business morning) or `stop`.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::models::{ReviewTask, TaskStatus};
use crate::slack::blocks;
use crate::state::AppState;
use crate::{AppError, Result};

use super::owning_config;

const MAX_PAUSE_HOURS: u32 = 24;

/// Requested pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseSpec {
    /// Pause for a number of hours.
    Hours(u32),
    /// Pause until the next business morning.
    Today,
    /// Stop reminders altogether.
    Stop,
}

impl PauseSpec {
    /// Parse the spec half of a pause value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for anything unrecognised.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "today" => return Ok(Self::Today),
            "stop" => return Ok(Self::Stop),
            _ => {}
        }
        raw.strip_suffix('h')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| (1..=MAX_PAUSE_HOURS).contains(n))
            .map(Self::Hours)
            .ok_or_else(|| AppError::Validation(format!("unknown pause option: {raw}")))
    }

    /// Wire form.
    #[must_use]
    pub fn as_value(self) -> String {
        match self {
            Self::Hours(n) => format!("{n}h"),
            Self::Today => "today".into(),
            Self::Stop => "stop".into(),
        }
    }
}

/// Split a pause control value into task id and spec.
///
/// # Errors
///
/// Returns `AppError::Validation` if the value is malformed.
pub fn parse_pause_value(value: &str) -> Result<(String, PauseSpec)> {
    let (task_id, spec) = value
        .rsplit_once(':')
        .ok_or_else(|| AppError::Validation(format!("malformed pause value: {value}")))?;
    if task_id.trim().is_empty() {
        return Err(AppError::Validation(format!("malformed pause value: {value}")));
    }
    Ok((task_id.trim().to_owned(), PauseSpec::parse(spec)?))
}

/// Apply a pause to the task and confirm it in the thread.
///
/// # Errors
///
/// Returns `AppError::Db` if the lookup or update fails.
pub async fn handle_pause(
    state: &AppState,
    mut task: ReviewTask,
    actor: &str,
    spec: PauseSpec,
) -> Result<ReviewTask> {
    let now = state.clock.now();
    let display_until = match spec {
        PauseSpec::Hours(hours) => {
            let until = now + Duration::hours(i64::from(hours));
            task.reminder_paused_until = Some(until);
            let cfg = owning_config(state, &task).await?;
            let tz = state.calendar.timezone_or_default(cfg.as_ref());
            Some(until.with_timezone(&tz))
        }
        PauseSpec::Today => {
            let cfg = owning_config(state, &task).await?;
            let morning = state.calendar.next_business_morning(now, cfg.as_ref());
            task.reminder_paused_until = Some(morning.with_timezone(&Utc));
            task.out_of_hours_reminded = false;
            Some(morning)
        }
        PauseSpec::Stop => {
            task.status = TaskStatus::Snoozed;
            None
        }
    };
    task.updated_at = now;
    state.tasks().update(&task).await?;

    info!(
        task_id = %task.id,
        user = actor,
        spec = %spec.as_value(),
        until = ?task.reminder_paused_until,
        "reminders paused"
    );

    if let Err(err) = state
        .chat
        .post_thread(
            &task.chat_channel,
            &task.chat_ts,
            blocks::pause_confirmation(actor, &spec.as_value(), display_until),
        )
        .await
    {
        warn!(%err, task_id = %task.id, "failed to post pause confirmation");
    }
    Ok(task)
}
