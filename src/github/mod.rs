//! GitHub webhook ingress.
//!
//! [`webhook`] decodes and authenticates deliveries; the handlers apply
//! label and review events to the task store and the chat channels.

pub mod label_handler;
pub mod review_handler;
pub mod webhook;

pub use webhook::{handle_delivery, verify_signature, WebhookEvent};
