//! Background loops and the channel-loss policy they share with handlers.

pub mod janitor;
pub mod reminder;

use tracing::info;

use crate::state::AppState;
use crate::Result;

/// Deactivate every config of a lost channel and archive its open tasks.
///
/// Returns `(configs_deactivated, tasks_archived)`.
///
/// # Errors
///
/// Returns `AppError::Db` if either update fails.
pub async fn retire_channel(state: &AppState, channel: &str) -> Result<(u64, u64)> {
    let now = state.clock.now();
    let configs = state.configs().deactivate_channel(channel, now).await?;
    let tasks = state.tasks().archive_channel(channel, now).await?;
    info!(channel, configs, tasks, "retired channel");
    Ok((configs, tasks))
}
