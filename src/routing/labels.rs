//! Label expression matching.
//!
//! A label expression is a comma-separated AND over label names. An empty
//! expression matches every pull request.

use crate::models::ChannelConfig;

/// Split an expression into its trimmed, non-empty entries.
#[must_use]
pub fn parse_expression(expression: &str) -> Vec<String> {
    expression
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Whether `labels` carries every entry of the config's expression.
#[must_use]
pub fn matches<S: AsRef<str>>(cfg: &ChannelConfig, labels: &[S]) -> bool {
    missing(cfg, labels).is_empty()
}

/// Expression entries not present on the pull request, in expression order.
#[must_use]
pub fn missing<S: AsRef<str>>(cfg: &ChannelConfig, labels: &[S]) -> Vec<String> {
    parse_expression(&cfg.label_expression)
        .into_iter()
        .filter(|wanted| !labels.iter().any(|have| have.as_ref().trim() == wanted))
        .collect()
}
