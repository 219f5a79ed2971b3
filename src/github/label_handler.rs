//! `labeled` / `unlabeled` fan-out across channel configs.
//!
//! A labelling event is offered to every active config in creation order.
//! Each config that accepts the repository and whose label expression is
//! satisfied gets at most one open task per (channel, PR); the check and
//! the insert share one exclusive transaction so concurrent deliveries for
//! the same PR cannot both create a task.

use tracing::{debug, info, warn};

use crate::errors::{classify_error, ChatErrorKind};
use crate::models::{ChannelConfig, PullRequestRef, ReviewTask, TaskStatus};
use crate::routing::{matches, missing, select_random};
use crate::slack::blocks;
use crate::state::AppState;
use crate::Result;

use super::webhook::PullRequestEvent;

/// Result of offering a PR to one config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
    /// A task was created.
    Created(Box<ReviewTask>),
    /// The channel already has an open task for the PR.
    Duplicate,
}

/// Handle a `labeled` event.
///
/// # Errors
///
/// Returns `AppError::Db` only if the config enumeration fails; per-config
/// failures are logged and the loop moves on.
pub async fn handle_labeled(state: &AppState, event: &PullRequestEvent) -> Result<()> {
    let repo = event.repository.full_name();
    let pr = event.pull_request.to_ref(&repo);
    let labels = event.pull_request.label_names();
    let configs = state.configs().list_all_active().await?;

    for cfg in &configs {
        match state.chat.is_channel_archived(&cfg.channel_id).await {
            Ok(true) => {
                info!(channel = %cfg.channel_id, config_id = %cfg.id, "channel archived; deactivating config");
                if let Err(err) = state.configs().deactivate(&cfg.id, state.clock.now()).await {
                    warn!(%err, config_id = %cfg.id, "failed to deactivate config");
                }
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(%err, channel = %cfg.channel_id, "channel check failed; trying anyway");
            }
        }
        if !cfg.accepts_repository(&repo) {
            debug!(channel = %cfg.channel_id, repo = %repo, "repository filtered out");
            continue;
        }
        if !matches(cfg, &labels) {
            debug!(channel = %cfg.channel_id, label = %cfg.label_expression, "labels do not match");
            continue;
        }

        match create_task(state, cfg, &pr).await {
            Ok(Creation::Created(task)) => info!(
                task_id = %task.id,
                channel = %task.chat_channel,
                repo = %task.repo,
                pr_number = task.pr_number,
                status = task.status.as_str(),
                "review task created"
            ),
            Ok(Creation::Duplicate) => info!(
                channel = %cfg.channel_id,
                repo = %pr.repo,
                pr_number = pr.number,
                "open task already exists; skipping"
            ),
            Err(err) => {
                warn!(%err, channel = %cfg.channel_id, repo = %pr.repo, pr_number = pr.number, "task creation failed");
                if classify_error(&err) == ChatErrorKind::ChannelRelated {
                    if let Err(err) = state.configs().deactivate(&cfg.id, state.clock.now()).await {
                        warn!(%err, config_id = %cfg.id, "failed to deactivate config");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Offer a PR to one config inside the creation transaction.
///
/// Inside business hours the root message mentions a randomly selected
/// reviewer and the task starts `in_review`; with nobody to assign it
/// starts `pending`. Outside business hours the message goes out without a
/// mention and the task waits for the day to start.
///
/// # Errors
///
/// Returns `AppError::Chat` if the root message cannot be posted, in which
/// case no task exists, or `AppError::Db` if the transaction fails.
pub async fn create_task(
    state: &AppState,
    cfg: &ChannelConfig,
    pr: &PullRequestRef,
) -> Result<Creation> {
    let mut tx = state.tasks().begin_creation().await?;
    if tx.has_active_task(&cfg.channel_id, &pr.repo, pr.number).await? {
        tx.rollback().await?;
        return Ok(Creation::Duplicate);
    }

    let now = state.clock.now();
    let mut task = ReviewTask::new(
        pr,
        cfg.channel_id.clone(),
        String::new(),
        cfg.label_expression.clone(),
        now,
    );
    let within = state.calendar.within_business_hours(cfg, now);
    if within {
        task.reviewer = select_random(cfg);
        task.status = if task.reviewer.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::InReview
        };
    } else {
        task.status = TaskStatus::WaitingBusinessHours;
    }

    let tz = state.calendar.timezone_for(cfg);
    let body = blocks::task_blocks(&task, tz);
    let posted = if task.status == TaskStatus::InReview {
        state
            .chat
            .post_message(&cfg.channel_id, body, Some(&task.reviewer))
            .await
    } else {
        state.chat.post_off_hours(&cfg.channel_id, body).await
    };
    let posted = match posted {
        Ok(posted) => posted,
        Err(err) => {
            tx.rollback().await?;
            return Err(err);
        }
    };
    task.chat_ts = posted.ts;

    if let Err(err) = tx.insert(&task).await {
        warn!(%err, channel = %task.chat_channel, ts = %task.chat_ts, "root message posted but task insert failed");
        tx.rollback().await?;
        return Err(err);
    }

    if task.status == TaskStatus::InReview {
        if let Err(err) = state
            .chat
            .post_thread(&task.chat_channel, &task.chat_ts, blocks::assignee_note(&task))
            .await
        {
            warn!(%err, task_id = %task.id, "failed to post assignee note");
        }
    }

    tx.commit().await?;
    Ok(Creation::Created(Box::new(task)))
}

/// Handle an `unlabeled` event: close every open task whose config no
/// longer matches the PR's remaining labels.
///
/// # Errors
///
/// Returns `AppError::Db` if the task lookup fails.
pub async fn handle_unlabeled(state: &AppState, event: &PullRequestEvent) -> Result<()> {
    let repo = event.repository.full_name();
    let labels = event.pull_request.label_names();
    let tasks = state
        .tasks()
        .find_active_by_pr(&repo, event.pull_request.number)
        .await?;

    for task in tasks {
        let lookup = state
            .configs()
            .get_by_channel_and_label(&task.chat_channel, &task.label_expression)
            .await;
        let cfg = match lookup {
            Ok(Some(cfg)) => cfg,
            Ok(None) => {
                debug!(
                    task_id = %task.id,
                    label = %task.label_expression,
                    "no config for task; leaving it"
                );
                continue;
            }
            Err(err) => {
                warn!(%err, task_id = %task.id, "config lookup failed");
                continue;
            }
        };
        if matches(&cfg, &labels) {
            debug!(task_id = %task.id, "labels still match; task stays open");
            continue;
        }

        let gone = missing(&cfg, &labels);
        if let Err(err) = complete_with_note(state, task, &cfg, &gone).await {
            warn!(%err, "failed to complete task after unlabel");
        }
    }
    Ok(())
}

async fn complete_with_note(
    state: &AppState,
    mut task: ReviewTask,
    cfg: &ChannelConfig,
    gone: &[String],
) -> Result<()> {
    let now = state.clock.now();
    if !state.tasks().complete(&task.id, now).await? {
        debug!(task_id = %task.id, "task already closed");
        return Ok(());
    }
    task.status = TaskStatus::Completed;
    task.updated_at = now;
    info!(task_id = %task.id, missing = ?gone, "review task completed by unlabel");

    let tz = state.calendar.timezone_for(cfg);
    if let Err(err) = state
        .chat
        .update_message(&task.chat_channel, &task.chat_ts, blocks::task_blocks(&task, tz))
        .await
    {
        warn!(%err, task_id = %task.id, "failed to mark root message completed");
    }
    if let Err(err) = state
        .chat
        .post_thread(&task.chat_channel, &task.chat_ts, blocks::missing_labels_note(gone))
        .await
    {
        warn!(%err, task_id = %task.id, "failed to post missing-label note");
    }
    Ok(())
}
