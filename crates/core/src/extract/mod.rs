//! Post-download archive extraction.
//!
//! zip/tar/gz/bz2 are handled in-process; 7z and rar are delegated to
//! external `7z`/`unrar` executables with a bounded timeout.

mod external;
mod extractor;
mod types;

pub use extractor::ArchiveExtractor;
pub use types::*;
