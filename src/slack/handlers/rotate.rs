//! "Change reviewer" button.

use tracing::{info, warn};

use crate::models::channel_config::DEFAULT_LABEL_EXPRESSION;
use crate::models::{ReviewTask, TaskStatus};
use crate::routing::select_rotated;
use crate::slack::blocks;
use crate::state::AppState;
use crate::Result;

use super::owning_config;

/// Hand the task to another pool member.
///
/// A pool with fewer than two distinct members leaves the assignment
/// as is. A new assignee gets a thread note with its own rotate control.
/// Legacy tasks without a label expression resolve against the default
/// label, which is written back onto the task.
///
/// # Errors
///
/// Returns `AppError::Db` if the lookup or update fails.
pub async fn handle_change_reviewer(
    state: &AppState,
    mut task: ReviewTask,
    actor: &str,
) -> Result<ReviewTask> {
    let legacy = task.label_expression.trim().is_empty();
    if legacy {
        task.label_expression = DEFAULT_LABEL_EXPRESSION.to_owned();
    }
    let cfg = owning_config(state, &task).await?;
    let Some(cfg) = cfg else {
        warn!(task_id = %task.id, label = %task.label_expression, "no config for rotation");
        if legacy {
            task.updated_at = state.clock.now();
            state.tasks().update(&task).await?;
        }
        return Ok(task);
    };

    let next = select_rotated(&task.reviewer, &cfg.reviewer_pool);
    if next == task.reviewer {
        info!(task_id = %task.id, reviewer = %task.reviewer, "rotation left reviewer unchanged");
        if legacy {
            task.updated_at = state.clock.now();
            state.tasks().update(&task).await?;
        }
        return Ok(task);
    }

    let previous = std::mem::replace(&mut task.reviewer, next);
    if matches!(task.status, TaskStatus::Pending | TaskStatus::WaitingBusinessHours) {
        task.status = TaskStatus::InReview;
    }
    task.out_of_hours_reminded = false;
    task.updated_at = state.clock.now();
    state.tasks().update(&task).await?;
    info!(
        task_id = %task.id,
        from = %previous,
        to = %task.reviewer,
        user = actor,
        "reviewer rotated"
    );

    if let Err(err) = state
        .chat
        .post_thread(&task.chat_channel, &task.chat_ts, blocks::assignee_note(&task))
        .await
    {
        warn!(%err, task_id = %task.id, "failed to post assignee note");
    }
    Ok(task)
}
