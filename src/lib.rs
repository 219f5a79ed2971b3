#![forbid(unsafe_code)]

//! Pull-request review notifications for Slack.
//!
//! GitHub label and review webhooks drive per-channel review tasks; Slack
//! buttons and slash commands steer them; a scheduler sends reminders
//! inside each channel's business hours.

pub mod calendar;
pub mod config;
pub mod errors;
pub mod github;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod routing;
pub mod server;
pub mod slack;
pub mod state;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
