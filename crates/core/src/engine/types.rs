//! Types for the torrent engine capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-side identifier of an attached torrent (lowercase hex info hash).
pub type TorrentId = String;

/// Errors that can occur inside a torrent engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    InitFailed(String),

    #[error("torrent not attached: {0}")]
    NotAttached(String),

    #[error("engine rejected torrent: {0}")]
    AttachRejected(String),

    #[error("session state is corrupt: {0}")]
    StateCorrupt(String),

    #[error("request timed out")]
    Timeout,

    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Request to attach a torrent to the engine.
///
/// The manager resolves file paths and URLs before this point; the engine
/// only ever sees a magnet URI or raw `.torrent` bytes.
#[derive(Debug, Clone)]
pub enum AttachRequest {
    /// Attach via magnet URI.
    Magnet {
        /// Magnet URI.
        uri: String,
        /// Destination directory for downloaded files.
        destination: Option<String>,
        /// Attach in paused state.
        paused: bool,
    },
    /// Attach via `.torrent` file contents.
    TorrentFile {
        /// Raw `.torrent` bytes.
        data: Vec<u8>,
        /// Original filename (for logging).
        filename: Option<String>,
        /// Destination directory for downloaded files.
        destination: Option<String>,
        /// Attach in paused state.
        paused: bool,
    },
}

impl AttachRequest {
    /// Create a magnet request with default options.
    pub fn magnet(uri: impl Into<String>) -> Self {
        AttachRequest::Magnet {
            uri: uri.into(),
            destination: None,
            paused: false,
        }
    }

    /// Create a torrent-file request with default options.
    pub fn torrent_file(data: Vec<u8>) -> Self {
        AttachRequest::TorrentFile {
            data,
            filename: None,
            destination: None,
            paused: false,
        }
    }

    /// Set the original filename (torrent-file requests only).
    pub fn with_filename(mut self, name: impl Into<String>) -> Self {
        if let AttachRequest::TorrentFile { filename, .. } = &mut self {
            *filename = Some(name.into());
        }
        self
    }

    /// Set the destination directory.
    pub fn with_destination(mut self, dest: impl Into<String>) -> Self {
        match &mut self {
            AttachRequest::Magnet { destination, .. } => *destination = Some(dest.into()),
            AttachRequest::TorrentFile { destination, .. } => *destination = Some(dest.into()),
        }
        self
    }

    /// Set whether to attach paused.
    pub fn with_paused(mut self, p: bool) -> Self {
        match &mut self {
            AttachRequest::Magnet { paused, .. } => *paused = p,
            AttachRequest::TorrentFile { paused, .. } => *paused = p,
        }
        self
    }

    /// Destination directory, if set.
    pub fn destination(&self) -> Option<&str> {
        match self {
            AttachRequest::Magnet { destination, .. } => destination.as_deref(),
            AttachRequest::TorrentFile { destination, .. } => destination.as_deref(),
        }
    }

    /// Whether the torrent should attach paused.
    pub fn paused(&self) -> bool {
        match self {
            AttachRequest::Magnet { paused, .. } => *paused,
            AttachRequest::TorrentFile { paused, .. } => *paused,
        }
    }
}

/// Result of attaching a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachResult {
    /// Info hash of the attached torrent.
    pub id: TorrentId,
    /// Torrent name (may be unknown for magnets until metadata resolves).
    pub name: Option<String>,
}

/// Live statistics for one attached torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentStats {
    /// Torrent name, once metadata is resolved.
    pub name: Option<String>,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total payload size in bytes (0 until metadata resolves).
    pub total_bytes: u64,
    /// Downloaded bytes.
    pub downloaded_bytes: u64,
    /// Uploaded bytes.
    pub uploaded_bytes: u64,
    /// Download speed in bytes/second.
    pub download_speed: u64,
    /// Upload speed in bytes/second.
    pub upload_speed: u64,
    /// Connected peers.
    pub peers: u32,
    /// Connected seeds.
    pub seeds: u32,
    /// Copies of the rarest piece available in the swarm.
    pub availability: f64,
    /// ETA in seconds (None if unknown or complete).
    pub eta_secs: Option<u64>,
    /// All pieces downloaded.
    pub finished: bool,
    /// Transfer is paused.
    pub paused: bool,
    /// Engine-reported error, if the torrent is in an error state.
    pub error: Option<String>,
    /// Directory the payload is written to.
    pub save_path: Option<String>,
}

impl Default for TorrentStats {
    fn default() -> Self {
        Self {
            name: None,
            progress: 0.0,
            total_bytes: 0,
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            download_speed: 0,
            upload_speed: 0,
            peers: 0,
            seeds: 0,
            availability: 0.0,
            eta_secs: None,
            finished: false,
            paused: false,
            error: None,
            save_path: None,
        }
    }
}

/// Severity of an engine-level message alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Event emitted by the engine's alert stream.
///
/// Alerts for a given torrent are delivered in the order the engine emitted
/// them; no ordering is guaranteed across torrents.
#[derive(Debug, Clone)]
pub enum EngineAlert {
    /// Periodic statistics update for an attached torrent.
    StatusUpdate { id: TorrentId, stats: TorrentStats },
    /// Metadata for a magnet link resolved.
    MetadataResolved {
        id: TorrentId,
        name: String,
        total_bytes: u64,
    },
    /// All pieces downloaded. Emitted at most once per attach.
    Completed { id: TorrentId },
    /// The torrent entered an error state.
    Failed { id: TorrentId, message: String },
    /// Engine-level diagnostic message not tied to a torrent.
    Message { severity: AlertSeverity, text: String },
}

/// A torrent re-attached during session-state restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredTorrent {
    /// Info hash.
    pub id: TorrentId,
    /// Name, if known.
    pub name: Option<String>,
    /// Destination directory.
    pub destination: Option<String>,
    /// Whether the torrent was paused at snapshot time.
    pub paused: bool,
}

/// Capability interface over an embeddable torrent engine.
///
/// The manager drives everything through this trait so the orchestration
/// logic (gate, catalog, notifications) stays testable without a network
/// stack.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Attach a torrent and start (or pause) it.
    async fn attach(&self, request: AttachRequest) -> Result<AttachResult, EngineError>;

    /// Detach a torrent. If `delete_files` is true, downloaded files are
    /// deleted as well.
    async fn detach(&self, id: &str, delete_files: bool) -> Result<(), EngineError>;

    /// Pause an attached torrent.
    async fn pause(&self, id: &str) -> Result<(), EngineError>;

    /// Resume a paused torrent.
    async fn resume(&self, id: &str) -> Result<(), EngineError>;

    /// Current statistics for an attached torrent.
    async fn stats(&self, id: &str) -> Result<TorrentStats, EngineError>;

    /// Ids and statistics of every attached torrent.
    async fn list(&self) -> Vec<(TorrentId, TorrentStats)>;

    /// Drain pending alerts. Returns an empty vec when nothing happened
    /// since the last poll.
    async fn poll_alerts(&self) -> Vec<EngineAlert>;

    /// Apply engine-wide bandwidth caps in KB/s. `0` means unlimited.
    async fn set_limits(&self, download_kbs: u64, upload_kbs: u64) -> Result<(), EngineError>;

    /// Serialize the engine's resumable state into an opaque blob. Safe to
    /// call while torrents are active.
    async fn save_state(&self) -> Result<Vec<u8>, EngineError>;

    /// Re-attach torrents from a blob produced by `save_state`.
    async fn load_state(&self, blob: &[u8]) -> Result<Vec<RestoredTorrent>, EngineError>;

    /// Stop all torrents and release resources. Idempotent.
    async fn shutdown(&self) -> Result<(), EngineError>;
}
