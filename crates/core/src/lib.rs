pub mod config;
pub mod engine;
pub mod extract;
pub mod health;
pub mod journal;
pub mod manager;
pub mod metrics;
pub mod session;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use engine::{
    AlertSeverity, AttachRequest, AttachResult, EngineAlert, EngineError, LibrqbitEngine,
    TorrentEngine, TorrentId, TorrentStats,
};
pub use extract::{ArchiveExtractor, ArchiveFormat, ExtractOutcome, ExtractionError};
pub use health::{HealthCheck, HealthChecker, TorrentHealthReport};
pub use journal::{LogLevel, LogStep, TorrentLogEntry, TorrentLogRecorder};
pub use manager::{
    ManagerError, ManagerSettings, TorrentDownloadManager, TorrentNotificationListener,
    TorrentState, TorrentStatus,
};
pub use session::{SessionStateError, SessionStateStore};
