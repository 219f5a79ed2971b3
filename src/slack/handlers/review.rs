//! "Take" and "watch" buttons.

use chrono::Duration;
use tracing::info;

use crate::models::{ReviewTask, TaskStatus};
use crate::state::AppState;
use crate::Result;

/// Legacy take: the actor becomes reviewer and the task returns to `pending`.
///
/// # Errors
///
/// Returns `AppError::Db` if the update fails.
pub async fn handle_take(
    state: &AppState,
    mut task: ReviewTask,
    actor: &str,
) -> Result<ReviewTask> {
    task.reviewer = actor.to_owned();
    task.status = TaskStatus::Pending;
    task.updated_at = state.clock.now();
    state.tasks().update(&task).await?;

    info!(task_id = %task.id, user = actor, "review taken");
    Ok(task)
}

/// The actor is looking at the PR; reminders stop until the watch lapses.
///
/// # Errors
///
/// Returns `AppError::Db` if the update fails.
pub async fn handle_watch(
    state: &AppState,
    mut task: ReviewTask,
    actor: &str,
) -> Result<ReviewTask> {
    let now = state.clock.now();
    task.reviewer = actor.to_owned();
    task.status = TaskStatus::Watching;
    task.watching_until = Some(now + Duration::hours(state.config.reminder.watch_hours));
    task.updated_at = now;
    state.tasks().update(&task).await?;

    info!(task_id = %task.id, user = actor, until = ?task.watching_until, "review watched");
    Ok(task)
}
