//! Domain model module declarations.

pub mod channel_config;
pub mod review_task;

pub use channel_config::ChannelConfig;
pub use review_task::{PullRequestRef, ReviewTask, TaskStatus};
