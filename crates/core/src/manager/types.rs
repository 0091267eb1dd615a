//! Types for the torrent download manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{EngineError, TorrentId};
use crate::session::SessionStateError;

/// Errors surfaced synchronously by manager operations.
///
/// Asynchronous engine failures (tracker errors, disk errors mid-download)
/// never appear here; they become an `Error` status, a journal entry and an
/// `on_torrent_error` notification instead.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The torrent source is empty or not a magnet/file/URL.
    #[error("invalid torrent source: {0}")]
    InvalidSource(String),

    /// The destination directory does not exist and cannot be created, or
    /// is not writable.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// No catalog entry for the given source.
    #[error("unknown torrent: {0}")]
    UnknownTorrent(String),

    /// The operation is not valid for the torrent's current status.
    #[error("invalid status for operation: expected {expected}, got {actual}")]
    InvalidStatus { expected: String, actual: String },

    /// Engine error during a user-initiated operation.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Session snapshot failed.
    #[error("session state error: {0}")]
    SessionState(#[from] SessionStateError),

    /// Fetching a .torrent file over HTTP failed.
    #[error("failed to fetch torrent file: {0}")]
    TorrentFetch(String),
}

/// Lifecycle status of a managed torrent.
///
/// Transitions: `Waiting -> Downloading -> {Paused, Completed, Error}`,
/// `Paused -> {Downloading, Waiting}`, `Error -> Waiting` (retry).
/// `Completed` is terminal for the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// Queued behind the concurrency gate.
    Waiting,
    /// Attached to the engine and transferring.
    Downloading,
    /// Paused by the user or the disk watchdog.
    Paused,
    /// All pieces downloaded.
    Completed,
    /// The engine reported a failure; waiting for an explicit retry.
    Error,
}

impl TorrentStatus {
    /// Returns the string representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentStatus::Waiting => "waiting",
            TorrentStatus::Downloading => "downloading",
            TorrentStatus::Paused => "paused",
            TorrentStatus::Completed => "completed",
            TorrentStatus::Error => "error",
        }
    }
}

/// Remaining-time value meaning "unknown / still calculating".
pub const REMAINING_TIME_UNKNOWN: i64 = -1;

/// Public snapshot of one managed torrent.
///
/// Owned by the manager; observers receive copies and route every mutation
/// through manager operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentState {
    /// Stable identity: magnet URI, `.torrent` path, or URL as supplied.
    pub torrent_source: String,
    /// Display name (resolved from metadata, may lag for magnets).
    pub name: String,
    /// Payload file name, when known.
    pub file_name: Option<String>,
    /// Directory downloaded files are written to.
    pub destination_path: String,
    /// Current lifecycle status.
    pub status: TorrentStatus,
    /// Download progress, 0-100.
    pub progress_percent: f32,
    /// Download speed in KB/s.
    pub download_speed_kbs: u64,
    /// Upload speed in KB/s.
    pub upload_speed_kbs: u64,
    /// Total payload size in bytes (0 until metadata resolves).
    pub file_size_bytes: u64,
    /// Connected peers.
    pub peers: u32,
    /// Connected seeds.
    pub seeds: u32,
    /// Estimated seconds remaining, `-1` = unknown.
    pub remaining_time_seconds: i64,
    /// When the torrent was added to the manager.
    pub added_at: DateTime<Utc>,
    /// Engine-side id once attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_id: Option<TorrentId>,
}

impl TorrentState {
    /// Create a fresh entry in `Waiting` state.
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: source.clone(),
            torrent_source: source,
            file_name: None,
            destination_path: destination.into(),
            status: TorrentStatus::Waiting,
            progress_percent: 0.0,
            download_speed_kbs: 0,
            upload_speed_kbs: 0,
            file_size_bytes: 0,
            peers: 0,
            seeds: 0,
            remaining_time_seconds: REMAINING_TIME_UNKNOWN,
            added_at: Utc::now(),
            torrent_id: None,
        }
    }
}

/// Live-reconfigurable manager settings, applied via `update_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Maximum simultaneous active downloads (0 = unlimited).
    pub max_concurrent_downloads: usize,
    /// Extract recognized archives after completion.
    pub extract_archives: bool,
    /// Engine-wide download cap in KB/s (0 = unlimited).
    pub download_limit_kbs: u64,
    /// Engine-wide upload cap in KB/s (0 = unlimited).
    pub upload_limit_kbs: u64,
    /// Automatically start the next waiting torrent when a slot frees.
    pub auto_start: bool,
}

impl From<&crate::config::ManagerConfig> for ManagerSettings {
    fn from(config: &crate::config::ManagerConfig) -> Self {
        Self {
            max_concurrent_downloads: config.max_concurrent_downloads,
            extract_archives: config.extract_archives,
            download_limit_kbs: config.download_limit_kbs,
            upload_limit_kbs: config.upload_limit_kbs,
            auto_start: config.auto_start,
        }
    }
}
