//! `pull_request_review` `submitted` handling.
//!
//! Open tasks for the PR are grouped by channel. Only the newest task of
//! each channel is told about the review; every task in the group is
//! completed so none of them keeps nagging.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::errors::{classify_error, ChatErrorKind};
use crate::models::{ReviewTask, TaskStatus};
use crate::slack::blocks;
use crate::state::AppState;
use crate::Result;

use super::webhook::PullRequestReviewEvent;

/// Review states that close a review request.
pub const CLOSING_STATES: [&str; 3] = ["approved", "changes_requested", "commented"];

/// Statuses a review can complete.
const REVIEWABLE: [TaskStatus; 3] = [
    TaskStatus::InReview,
    TaskStatus::Pending,
    TaskStatus::WaitingBusinessHours,
];

/// Handle a submitted review.
///
/// # Errors
///
/// Returns `AppError::Db` if the task lookup fails.
pub async fn handle_review_submitted(state: &AppState, event: &PullRequestReviewEvent) -> Result<()> {
    let review_state = event.review.state.to_ascii_lowercase();
    if !CLOSING_STATES.contains(&review_state.as_str()) {
        debug!(state = %review_state, "review state does not close tasks");
        return Ok(());
    }

    let repo = event.repository.full_name();
    let tasks = state
        .tasks()
        .find_by_pr_and_status(&repo, event.pull_request.number, &REVIEWABLE)
        .await?;

    let mut by_channel: BTreeMap<String, Vec<ReviewTask>> = BTreeMap::new();
    for task in tasks {
        by_channel.entry(task.chat_channel.clone()).or_default().push(task);
    }

    let reviewer = event.review.user.display_name();
    for (channel, mut group) in by_channel {
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let Some(latest) = group.last() else {
            continue;
        };

        let note = blocks::review_submitted_note(reviewer, &review_state);
        if let Err(err) = state
            .chat
            .post_thread(&latest.chat_channel, &latest.chat_ts, note)
            .await
        {
            if classify_error(&err) == ChatErrorKind::ChannelRelated {
                warn!(%err, channel = %channel, "channel unreachable; completing without notice");
            } else {
                warn!(%err, channel = %channel, "review note failed; leaving tasks open");
                continue;
            }
        }

        complete_group(state, group).await;
    }
    Ok(())
}

async fn complete_group(state: &AppState, group: Vec<ReviewTask>) {
    let now = state.clock.now();
    for mut task in group {
        match state.tasks().complete(&task.id, now).await {
            Ok(true) => {
                info!(task_id = %task.id, channel = %task.chat_channel, "review task completed by review");
                task.status = TaskStatus::Completed;
                task.updated_at = now;
                let tz = match state
                    .configs()
                    .get_by_channel_and_label(&task.chat_channel, &task.label_expression)
                    .await
                {
                    Ok(cfg) => state.calendar.timezone_or_default(cfg.as_ref()),
                    Err(_) => state.calendar.timezone_or_default(None),
                };
                if let Err(err) = state
                    .chat
                    .update_message(&task.chat_channel, &task.chat_ts, blocks::task_blocks(&task, tz))
                    .await
                {
                    debug!(%err, task_id = %task.id, "failed to mark root message completed");
                }
            }
            Ok(false) => debug!(task_id = %task.id, "task already closed"),
            Err(err) => warn!(%err, task_id = %task.id, "failed to complete task"),
        }
    }
}
