//! Channel liveness sweep and retention purge.
//!
//! Runs hourly by default. Channels that have been archived (or that the
//! bot can no longer see) are retired, then closed tasks past their
//! retention window are deleted.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::retire_channel;
use crate::state::AppState;
use crate::Result;

/// Outcome of one janitor pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JanitorReport {
    /// Channels found archived.
    pub channels_retired: usize,
    /// Configs deactivated while retiring channels.
    pub configs_deactivated: u64,
    /// Open tasks archived while retiring channels.
    pub tasks_archived: u64,
    /// Rows deleted by the retention purge.
    pub tasks_purged: u64,
}

/// Spawn the janitor background task.
#[must_use]
pub fn spawn_janitor_task(state: Arc<AppState>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.janitor.tick_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("janitor shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match run_once(&state).await {
                        Ok(report) => info!(?report, "janitor pass completed"),
                        Err(err) => error!(%err, "janitor pass failed"),
                    }
                }
            }
        }
    })
}

/// Run the liveness sweep followed by the retention purge.
///
/// # Errors
///
/// Returns `AppError::Db` if listing configs or purging fails. A failed
/// liveness probe only skips that channel.
pub async fn run_once(state: &AppState) -> Result<JanitorReport> {
    let mut report = JanitorReport::default();

    let channels: BTreeSet<String> = state
        .configs()
        .list_all_active()
        .await?
        .into_iter()
        .map(|cfg| cfg.channel_id)
        .collect();

    for channel in channels {
        match state.chat.is_channel_archived(&channel).await {
            Ok(true) => {
                let (configs, tasks) = retire_channel(state, &channel).await?;
                report.channels_retired += 1;
                report.configs_deactivated += configs;
                report.tasks_archived += tasks;
            }
            Ok(false) => {}
            Err(err) => warn!(%err, channel, "channel liveness probe failed"),
        }
        tokio::task::yield_now().await;
    }

    let now = state.clock.now();
    let terminal_cutoff = now - chrono::Duration::hours(state.config.janitor.terminal_retention_hours);
    let snoozed_cutoff = now - chrono::Duration::days(state.config.janitor.snoozed_retention_days);
    report.tasks_purged = state.tasks().purge(terminal_cutoff, snoozed_cutoff).await?;

    Ok(report)
}
