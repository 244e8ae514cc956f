//! Output formatting for hierarchical inference results.

mod json;
mod terminal;

pub use json::{to_json, to_json_pretty};
pub use terminal::{format_grid, format_outcome, format_posterior};
