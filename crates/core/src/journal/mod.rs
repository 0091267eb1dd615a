//! Per-torrent diagnostic journal.
//!
//! Records structured lifecycle events (step, level, timestamp, message) per
//! torrent so the UI can show a download's history on demand.

mod recorder;
mod types;

pub use recorder::*;
pub use types::*;
