//! Types for the per-torrent download journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle step a journal entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStep {
    /// Torrent was added to the manager.
    Added,
    /// Source/destination validation.
    Validating,
    /// Attaching to the engine, resolving metadata.
    Connecting,
    /// Transfer in progress.
    Downloading,
    /// Post-download archive extraction.
    Extracting,
    /// Download finished.
    Completed,
    /// Something went wrong.
    Error,
    /// Download paused.
    Paused,
    /// Download resumed.
    Resumed,
    /// Torrent removed from the manager.
    Removed,
}

impl LogStep {
    /// Returns the string representation for display and serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStep::Added => "added",
            LogStep::Validating => "validating",
            LogStep::Connecting => "connecting",
            LogStep::Downloading => "downloading",
            LogStep::Extracting => "extracting",
            LogStep::Completed => "completed",
            LogStep::Error => "error",
            LogStep::Paused => "paused",
            LogStep::Resumed => "resumed",
            LogStep::Removed => "removed",
        }
    }
}

/// Severity of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// One immutable journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentLogEntry {
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle step.
    pub step: LogStep,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_step_as_str() {
        assert_eq!(LogStep::Added.as_str(), "added");
        assert_eq!(LogStep::Extracting.as_str(), "extracting");
        assert_eq!(LogStep::Removed.as_str(), "removed");
    }

    #[test]
    fn test_log_level_serialization() {
        assert_eq!(
            serde_json::to_string(&LogLevel::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&LogStep::Connecting).unwrap(),
            "\"connecting\""
        );
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = TorrentLogEntry {
            timestamp: Utc::now(),
            step: LogStep::Downloading,
            level: LogLevel::Info,
            message: "42% complete".to_string(),
        };

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: TorrentLogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.step, LogStep::Downloading);
        assert_eq!(parsed.level, LogLevel::Info);
        assert_eq!(parsed.message, "42% complete");
    }
}
