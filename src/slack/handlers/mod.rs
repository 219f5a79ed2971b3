//! Interaction handlers, one per control family.
//!
//! Each handler receives the resolved task, mutates and persists it, and
//! returns the updated record. Re-rendering the root message is left to
//! the dispatcher in [`crate::slack::events`].

pub mod pause;
pub mod review;
pub mod rotate;

use crate::models::{ChannelConfig, ReviewTask};
use crate::state::AppState;
use crate::Result;

/// Config that owns a task, by exact `(chat_channel, label_expression)`.
///
/// # Errors
///
/// Returns `AppError::Db` if the lookup fails.
pub async fn owning_config(state: &AppState, task: &ReviewTask) -> Result<Option<ChannelConfig>> {
    state
        .configs()
        .get_by_channel_and_label(&task.chat_channel, &task.label_expression)
        .await
}
