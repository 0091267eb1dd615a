//! Types for post-download archive extraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during archive extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("unsafe entry path in archive: {0}")]
    UnsafeEntryPath(String),

    #[error("external tool not available: {0}")]
    ToolMissing(String),

    #[error("external process failed ({tool}, exit code {code:?}): {stderr}")]
    ExternalProcess {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("extraction timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Archive formats the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    Gzip,
    TarBz2,
    Bzip2,
    SevenZ,
    Rar,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Gzip => "gz",
            ArchiveFormat::TarBz2 => "tar.bz2",
            ArchiveFormat::Bzip2 => "bz2",
            ArchiveFormat::SevenZ => "7z",
            ArchiveFormat::Rar => "rar",
        }
    }

    /// Whether this format is handled by an external process.
    pub fn is_external(&self) -> bool {
        matches!(self, ArchiveFormat::SevenZ | ArchiveFormat::Rar)
    }
}

/// Outcome of an `extract_if_archive` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractOutcome {
    /// Format that was detected, None when the file was not an archive
    /// (in which case the call was a no-op).
    pub format: Option<ArchiveFormat>,
    /// Number of files written to the destination.
    pub files_extracted: u64,
    /// Total uncompressed bytes written.
    pub total_bytes: u64,
}

impl ExtractOutcome {
    /// Outcome for a file that is not a recognized archive.
    pub fn not_an_archive() -> Self {
        Self::default()
    }

    /// True when the input was a recognized archive.
    pub fn was_archive(&self) -> bool {
        self.format.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_as_str() {
        assert_eq!(ArchiveFormat::Zip.as_str(), "zip");
        assert_eq!(ArchiveFormat::TarBz2.as_str(), "tar.bz2");
        assert_eq!(ArchiveFormat::SevenZ.as_str(), "7z");
    }

    #[test]
    fn test_external_formats() {
        assert!(ArchiveFormat::SevenZ.is_external());
        assert!(ArchiveFormat::Rar.is_external());
        assert!(!ArchiveFormat::Zip.is_external());
        assert!(!ArchiveFormat::TarGz.is_external());
    }

    #[test]
    fn test_not_an_archive_outcome() {
        let outcome = ExtractOutcome::not_an_archive();
        assert!(!outcome.was_archive());
        assert_eq!(outcome.files_extracted, 0);
    }

    #[test]
    fn test_error_display() {
        let err = ExtractionError::Timeout { timeout_secs: 60 };
        assert_eq!(err.to_string(), "extraction timed out after 60s");

        let err = ExtractionError::ToolMissing("unrar".to_string());
        assert_eq!(err.to_string(), "external tool not available: unrar");
    }
}
