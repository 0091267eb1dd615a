use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// Download manager configuration.
///
/// All fields can be live-reconfigured through the manager's
/// `update_config`; none of them require an engine restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagerConfig {
    /// Maximum torrents downloading at once (0 = unlimited).
    /// Lowering this never pauses already-active torrents; it only
    /// throttles future admissions.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Extract recognized archives after a download completes.
    #[serde(default = "default_true")]
    pub extract_archives: bool,

    /// Engine-wide download cap in KB/s (0 = unlimited).
    #[serde(default)]
    pub download_limit_kbs: u64,

    /// Engine-wide upload cap in KB/s (0 = unlimited).
    #[serde(default)]
    pub upload_limit_kbs: u64,

    /// Automatically promote the next waiting torrent when a slot frees.
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// How often the alert loop drains the engine (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Free-space floor for the disk watchdog. Active downloads are paused
    /// when available space under a destination drops below this.
    #[serde(default = "default_min_free_disk")]
    pub min_free_disk_bytes: u64,

    /// Journal entries kept per torrent.
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_min_free_disk() -> u64 {
    500 * 1024 * 1024 // 500 MiB
}

fn default_journal_capacity() -> usize {
    500
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            extract_archives: true,
            download_limit_kbs: 0,
            upload_limit_kbs: 0,
            auto_start: true,
            poll_interval_ms: default_poll_interval(),
            min_free_disk_bytes: default_min_free_disk(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

/// Torrent engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Default directory downloads are written to.
    #[serde(default = "default_download_path")]
    pub download_path: String,

    /// Enable DHT for trackerless magnets.
    #[serde(default = "default_true")]
    pub enable_dht: bool,

    /// Fixed TCP listen port (None = let the engine pick).
    #[serde(default)]
    pub listen_port: Option<u16>,

    /// How long to wait for magnet metadata before failing the add (seconds).
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
}

fn default_download_path() -> String {
    "downloads".to_string()
}

fn default_metadata_timeout() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            enable_dht: true,
            listen_port: None,
            metadata_timeout_secs: default_metadata_timeout(),
        }
    }
}

/// Archive extractor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    /// `7z` executable used for .7z archives.
    #[serde(default = "default_sevenzip_path")]
    pub sevenzip_path: String,

    /// `unrar` executable used for .rar archives.
    #[serde(default = "default_unrar_path")]
    pub unrar_path: String,

    /// Hard timeout for external extraction processes (seconds).
    #[serde(default = "default_extract_timeout")]
    pub external_timeout_secs: u64,
}

fn default_sevenzip_path() -> String {
    "7z".to_string()
}

fn default_unrar_path() -> String {
    "unrar".to_string()
}

fn default_extract_timeout() -> u64 {
    60
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sevenzip_path: default_sevenzip_path(),
            unrar_path: default_unrar_path(),
            external_timeout_secs: default_extract_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert!(config.extract_archives);
        assert_eq!(config.download_limit_kbs, 0);
        assert!(config.auto_start);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.journal_capacity, 500);
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.download_path, "downloads");
        assert!(config.enable_dht);
        assert!(config.listen_port.is_none());
        assert_eq!(config.metadata_timeout_secs, 60);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.manager.max_concurrent_downloads, 3);
        assert_eq!(config.extractor.external_timeout_secs, 60);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            [manager]
            max_concurrent_downloads = 1
            extract_archives = false
            download_limit_kbs = 2048
            upload_limit_kbs = 128
            auto_start = false
            poll_interval_ms = 250

            [engine]
            download_path = "/media/incoming"
            enable_dht = false
            listen_port = 6881

            [extractor]
            sevenzip_path = "/usr/bin/7z"
            external_timeout_secs = 120
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.manager.max_concurrent_downloads, 1);
        assert!(!config.manager.extract_archives);
        assert_eq!(config.manager.download_limit_kbs, 2048);
        assert!(!config.manager.auto_start);
        assert_eq!(config.engine.download_path, "/media/incoming");
        assert_eq!(config.engine.listen_port, Some(6881));
        assert_eq!(config.extractor.sevenzip_path, "/usr/bin/7z");
        assert_eq!(config.extractor.external_timeout_secs, 120);
    }
}
