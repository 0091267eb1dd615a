//! On-demand torrent health diagnostics.
//!
//! Runs a fixed, ordered battery of checks against a live torrent and
//! produces a pass/fail report for the diagnostics UI. Every check runs
//! independently; one failure never short-circuits the rest.

mod checker;
mod types;

pub use checker::*;
pub use types::*;
