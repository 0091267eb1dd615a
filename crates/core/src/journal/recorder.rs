//! Append-only per-torrent journal with bounded memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::Utc;

use super::{LogLevel, LogStep, TorrentLogEntry};

/// Default number of entries kept per torrent.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 500;

/// Thread-safe, append-only journal of download events, keyed by torrent
/// source. Each torrent keeps at most `capacity` entries; older entries are
/// dropped first.
#[derive(Debug)]
pub struct TorrentLogRecorder {
    entries: Mutex<HashMap<String, VecDeque<TorrentLogEntry>>>,
    capacity: usize,
}

impl Default for TorrentLogRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TorrentLogRecorder {
    /// Create a recorder with the default per-torrent capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    /// Create a recorder keeping at most `capacity` entries per torrent.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry to a torrent's journal.
    pub fn record(
        &self,
        torrent_id: &str,
        step: LogStep,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let entry = TorrentLogEntry {
            timestamp: Utc::now(),
            step,
            level,
            message: message.into(),
        };

        let mut entries = self.entries.lock().expect("journal lock poisoned");
        let log = entries.entry(torrent_id.to_string()).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(entry);
    }

    /// Snapshot of a torrent's journal, oldest first. Empty if nothing was
    /// recorded for this id.
    pub fn entries_for(&self, torrent_id: &str) -> Vec<TorrentLogEntry> {
        self.entries
            .lock()
            .expect("journal lock poisoned")
            .get(torrent_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all entries for a torrent (called when it is removed).
    pub fn clear(&self, torrent_id: &str) {
        self.entries
            .lock()
            .expect("journal lock poisoned")
            .remove(torrent_id);
    }

    /// Number of torrents with at least one entry.
    pub fn torrent_count(&self) -> usize {
        self.entries.lock().expect("journal lock poisoned").len()
    }
}
