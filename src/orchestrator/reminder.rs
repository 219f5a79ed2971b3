//! Reminder scheduler.
//!
//! One ticker drives four sweeps per tick, in order: lapsed watches,
//! waiting tasks whose business day has started, unassigned `pending`
//! tasks, and assigned `in_review` tasks. Each task is handled with
//! single-row writes and the loop yields between tasks, so an interrupted
//! tick leaves nothing half-done.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::errors::{classify_error, ChatErrorKind};
use crate::models::channel_config::MAX_REMINDER_INTERVAL_MINUTES;
use crate::models::{ChannelConfig, ReviewTask, TaskStatus};
use crate::routing::select_random;
use crate::slack::blocks;
use crate::state::AppState;
use crate::{AppError, Result};

/// Counters for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Watches that lapsed.
    pub watches_expired: usize,
    /// Waiting tasks moved on at the start of business hours.
    pub woken: usize,
    /// "Needs a reviewer" reminders.
    pub pending_reminded: usize,
    /// Reviewer nudges inside business hours.
    pub reviewer_reminded: usize,
    /// One-shot out-of-hours reminders.
    pub out_of_hours_reminded: usize,
    /// Tasks archived because their channel is gone.
    pub archived: usize,
}

/// Spawn the reminder loop.
#[must_use]
pub fn spawn_reminder_task(state: Arc<AppState>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.reminder.tick_seconds.max(1));
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("reminder scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match run_tick(&state).await {
                            Ok(report) if report != TickReport::default() => {
                                info!(?report, "reminder tick");
                            }
                            Ok(_) => debug!("reminder tick idle"),
                            Err(err) => error!(%err, "reminder tick failed"),
                        }
                    }
                }
            }
        }
        .instrument(info_span!("reminder_scheduler")),
    )
}

/// Per-tick cache of configs keyed by `(channel, label_expression)`.
struct ConfigCache<'a> {
    state: &'a AppState,
    entries: HashMap<(String, String), Option<ChannelConfig>>,
}

impl<'a> ConfigCache<'a> {
    fn new(state: &'a AppState) -> Self {
        Self {
            state,
            entries: HashMap::new(),
        }
    }

    async fn get(&mut self, task: &ReviewTask) -> Result<Option<ChannelConfig>> {
        let key = (task.chat_channel.clone(), task.label_expression.clone());
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        let cfg = self
            .state
            .configs()
            .get_by_channel_and_label(&key.0, &key.1)
            .await?;
        self.entries.insert(key, cfg.clone());
        Ok(cfg)
    }
}

/// Run every sweep once.
///
/// # Errors
///
/// Returns `AppError::Db` if a status listing fails. Failures on single
/// tasks are logged and skipped.
pub async fn run_tick(state: &AppState) -> Result<TickReport> {
    let mut report = TickReport::default();
    let mut configs = ConfigCache::new(state);

    sweep_watching(state, &mut configs, &mut report).await?;
    sweep_waiting(state, &mut configs, &mut report).await?;
    sweep_pending(state, &mut configs, &mut report).await?;
    sweep_in_review(state, &mut configs, &mut report).await?;
    Ok(report)
}

fn interval_minutes(state: &AppState, cfg: Option<&ChannelConfig>) -> i64 {
    cfg.map(|c| c.reminder_interval)
        .filter(|m| (1..=MAX_REMINDER_INTERVAL_MINUTES).contains(m))
        .unwrap_or(state.config.reminder.default_interval_minutes)
}

/// An interval that cannot be represented is never due.
fn is_due(task: &ReviewTask, minutes: i64, now: DateTime<Utc>) -> bool {
    chrono::Duration::try_minutes(minutes)
        .and_then(|interval| task.updated_at.checked_add_signed(interval))
        .is_some_and(|due| due <= now)
}

/// Apply the failure policy to a chat error raised while handling `task`.
/// Returns `true` when the task was archived.
async fn on_chat_failure(
    state: &AppState,
    task: &ReviewTask,
    cfg: Option<&ChannelConfig>,
    err: &AppError,
) -> bool {
    if classify_error(err) != ChatErrorKind::ChannelRelated {
        warn!(%err, task_id = %task.id, "chat call failed; retrying next tick");
        return false;
    }
    let now = state.clock.now();
    warn!(%err, task_id = %task.id, channel = %task.chat_channel, "channel lost; archiving task");
    if let Err(db_err) = state.tasks().archive(&task.id, now).await {
        error!(%db_err, task_id = %task.id, "failed to archive task");
        return false;
    }
    if let Some(cfg) = cfg {
        if let Err(db_err) = state.configs().deactivate(&cfg.id, now).await {
            error!(%db_err, config_id = %cfg.id, "failed to deactivate config");
        }
    }
    true
}

async fn sweep_watching(
    state: &AppState,
    configs: &mut ConfigCache<'_>,
    report: &mut TickReport,
) -> Result<()> {
    let tasks = state.tasks().list_by_status(TaskStatus::Watching).await?;
    for mut task in tasks {
        let now = state.clock.now();
        if task.watching_until.is_some_and(|until| until > now) {
            continue;
        }

        let clash = state
            .tasks()
            .has_other_active(&task.chat_channel, &task.repo, task.pr_number, &task.id)
            .await;
        match clash {
            Ok(true) => {
                if let Err(err) = state.tasks().complete(&task.id, now).await {
                    warn!(%err, task_id = %task.id, "failed to close superseded watch");
                } else {
                    info!(task_id = %task.id, "watch lapsed; newer task owns the channel");
                    report.watches_expired += 1;
                }
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(%err, task_id = %task.id, "uniqueness check failed");
                continue;
            }
        }

        let cfg = configs.get(&task).await?;
        task.status = TaskStatus::InReview;
        task.watching_until = None;
        task.updated_at = now;
        let tz = state.calendar.timezone_or_default(cfg.as_ref());
        if let Err(err) = state
            .chat
            .post_thread(&task.chat_channel, &task.chat_ts, blocks::watch_expired_note(&task.reviewer))
            .await
        {
            if on_chat_failure(state, &task, cfg.as_ref(), &err).await {
                report.archived += 1;
            }
            continue;
        }
        if let Err(err) = state.tasks().update(&task).await {
            warn!(%err, task_id = %task.id, "failed to reopen watched task");
            continue;
        }
        if let Err(err) = state
            .chat
            .update_message(&task.chat_channel, &task.chat_ts, blocks::task_blocks(&task, tz))
            .await
        {
            debug!(%err, task_id = %task.id, "failed to refresh root message");
        }
        info!(task_id = %task.id, "watch lapsed; back in review");
        report.watches_expired += 1;
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn sweep_waiting(
    state: &AppState,
    configs: &mut ConfigCache<'_>,
    report: &mut TickReport,
) -> Result<()> {
    let tasks = state
        .tasks()
        .list_by_status(TaskStatus::WaitingBusinessHours)
        .await?;
    for mut task in tasks {
        let now = state.clock.now();
        let cfg = configs.get(&task).await?;
        if let Some(cfg) = cfg.as_ref() {
            if !state.calendar.within_business_hours(cfg, now) {
                continue;
            }
        }

        task.reviewer = cfg.as_ref().map(select_random).unwrap_or_default();
        task.status = if task.reviewer.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::InReview
        };
        task.out_of_hours_reminded = false;
        task.updated_at = now;

        let tz = state.calendar.timezone_or_default(cfg.as_ref());
        if let Err(err) = state
            .chat
            .update_message(&task.chat_channel, &task.chat_ts, blocks::task_blocks(&task, tz))
            .await
        {
            if on_chat_failure(state, &task, cfg.as_ref(), &err).await {
                report.archived += 1;
            }
            continue;
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
        if let Err(err) = state.tasks().update(&task).await {
            warn!(%err, task_id = %task.id, "failed to persist woken task");
            continue;
        }

        info!(
            task_id = %task.id,
            reviewer = %task.reviewer,
            status = task.status.as_str(),
            "business hours started; task woken"
        );
        report.woken += 1;
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn sweep_pending(
    state: &AppState,
    configs: &mut ConfigCache<'_>,
    report: &mut TickReport,
) -> Result<()> {
    let tasks = state.tasks().list_by_status(TaskStatus::Pending).await?;
    for mut task in tasks {
        let now = state.clock.now();
        if !task.reviewer.is_empty() || task.is_paused_at(now) {
            continue;
        }
        let cfg = configs.get(&task).await?;
        if !is_due(&task, interval_minutes(state, cfg.as_ref()), now) {
            continue;
        }

        if let Err(err) = state
            .chat
            .post_thread(&task.chat_channel, &task.chat_ts, blocks::reminder_needs_reviewer())
            .await
        {
            if on_chat_failure(state, &task, cfg.as_ref(), &err).await {
                report.archived += 1;
            }
            continue;
        }
        task.updated_at = now;
        if let Err(err) = state.tasks().update(&task).await {
            warn!(%err, task_id = %task.id, "failed to record reminder");
            continue;
        }
        debug!(task_id = %task.id, "needs-reviewer reminder sent");
        report.pending_reminded += 1;
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn sweep_in_review(
    state: &AppState,
    configs: &mut ConfigCache<'_>,
    report: &mut TickReport,
) -> Result<()> {
    let tasks = state.tasks().list_by_status(TaskStatus::InReview).await?;
    for mut task in tasks {
        let now = state.clock.now();
        if task.reviewer.is_empty() || task.is_paused_at(now) {
            continue;
        }
        let cfg = configs.get(&task).await?;
        let within = cfg
            .as_ref()
            .is_none_or(|c| state.calendar.within_business_hours(c, now));

        if within {
            let mut dirty = false;
            if task.out_of_hours_reminded {
                task.out_of_hours_reminded = false;
                task.reminder_paused_until = None;
                dirty = true;
            }
            if is_due(&task, interval_minutes(state, cfg.as_ref()), now) {
                if let Err(err) = state
                    .chat
                    .post_thread(&task.chat_channel, &task.chat_ts, blocks::reminder_reviewer(&task.reviewer))
                    .await
                {
                    if on_chat_failure(state, &task, cfg.as_ref(), &err).await {
                        report.archived += 1;
                        continue;
                    }
                } else {
                    task.updated_at = now;
                    dirty = true;
                    report.reviewer_reminded += 1;
                }
            }
            if dirty {
                if let Err(err) = state.tasks().update(&task).await {
                    warn!(%err, task_id = %task.id, "failed to record reminder");
                }
            }
        } else {
            if task.out_of_hours_reminded
                || !is_due(&task, interval_minutes(state, cfg.as_ref()), now)
            {
                continue;
            }
            let morning = state.calendar.next_business_morning(now, cfg.as_ref());
            if let Err(err) = state
                .chat
                .post_thread(
                    &task.chat_channel,
                    &task.chat_ts,
                    blocks::reminder_out_of_hours(&task.reviewer, morning),
                )
                .await
            {
                if on_chat_failure(state, &task, cfg.as_ref(), &err).await {
                    report.archived += 1;
                }
                continue;
            }
            task.out_of_hours_reminded = true;
            task.reminder_paused_until = Some(morning.with_timezone(&Utc));
            task.updated_at = now;
            if let Err(err) = state.tasks().update(&task).await {
                warn!(%err, task_id = %task.id, "failed to record out-of-hours reminder");
                continue;
            }
            debug!(task_id = %task.id, resume = %morning, "out-of-hours reminder sent");
            report.out_of_hours_reminded += 1;
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}
