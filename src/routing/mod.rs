//! Routing decisions: which configs a pull request matches, and who reviews it.

pub mod labels;
pub mod reviewer;

pub use labels::{matches, missing, parse_expression};
pub use reviewer::{select_random, select_rotated};
