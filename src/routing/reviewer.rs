//! Random reviewer assignment and rotation.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::ChannelConfig;

/// Distinct, non-blank pool members in their configured order.
fn candidates(pool: &[String]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::with_capacity(pool.len());
    for member in pool.iter().map(|m| m.trim()) {
        if !member.is_empty() && !seen.contains(&member) {
            seen.push(member);
        }
    }
    seen
}

/// Pick a reviewer for a new task: a uniformly random pool member, or the
/// config's default mention when the pool is empty.
#[must_use]
pub fn select_random(cfg: &ChannelConfig) -> String {
    select_random_with(cfg, &mut rand::thread_rng())
}

/// [`select_random`] with a caller-supplied generator.
#[must_use]
pub fn select_random_with<R: Rng + ?Sized>(cfg: &ChannelConfig, rng: &mut R) -> String {
    candidates(&cfg.reviewer_pool)
        .choose(rng)
        .map_or_else(|| cfg.default_mention.trim().to_owned(), |m| (*m).to_owned())
}

/// Rotate away from `current`.
///
/// Returns `current` unchanged when fewer than two distinct members exist,
/// otherwise a uniformly random member other than `current`.
#[must_use]
pub fn select_rotated(current: &str, pool: &[String]) -> String {
    select_rotated_with(current, pool, &mut rand::thread_rng())
}

/// [`select_rotated`] with a caller-supplied generator.
#[must_use]
pub fn select_rotated_with<R: Rng + ?Sized>(current: &str, pool: &[String], rng: &mut R) -> String {
    let members = candidates(pool);
    if members.len() < 2 {
        return current.to_owned();
    }
    let others: Vec<&str> = members.into_iter().filter(|m| *m != current).collect();
    others
        .choose(rng)
        .map_or_else(|| current.to_owned(), |m| (*m).to_owned())
}
