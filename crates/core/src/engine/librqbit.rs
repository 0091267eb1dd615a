//! Embedded librqbit engine backend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use librqbit::{
    AddTorrent as RqbitAddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session,
    SessionOptions,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;

use super::{
    AttachRequest, AttachResult, EngineAlert, EngineError, RestoredTorrent, TorrentEngine,
    TorrentId, TorrentStats,
};

/// Per-torrent bookkeeping used to synthesize the alert stream.
#[derive(Debug, Default, Clone)]
struct AlertTrack {
    metadata_announced: bool,
    completed_announced: bool,
    failed_announced: bool,
    destination: Option<String>,
}

/// One entry of the serialized session blob.
#[derive(Debug, Serialize, Deserialize)]
struct ResumeEntry {
    magnet: String,
    name: Option<String>,
    destination: Option<String>,
    paused: bool,
}

/// Embedded torrent engine backed by a `librqbit::Session`.
///
/// librqbit has no native alert queue; `poll_alerts` synthesizes one by
/// diffing each torrent's statistics against the previous poll.
pub struct LibrqbitEngine {
    session: Arc<Session>,
    download_path: PathBuf,
    metadata_timeout_secs: u64,
    tracks: RwLock<HashMap<TorrentId, AlertTrack>>,
}

impl LibrqbitEngine {
    /// Create a new engine from configuration.
    pub async fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let download_path = PathBuf::from(&config.download_path);

        if !download_path.exists() {
            std::fs::create_dir_all(&download_path).map_err(|e| {
                EngineError::InitFailed(format!("Failed to create download directory: {}", e))
            })?;
        }

        let mut opts = SessionOptions::default();

        if !config.enable_dht {
            opts.disable_dht = true;
        }

        // Range, not RangeInclusive
        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        info!(
            download_path = %download_path.display(),
            dht_enabled = !opts.disable_dht,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(download_path.clone(), opts)
            .await
            .map_err(|e| {
                EngineError::InitFailed(format!("Failed to initialize librqbit session: {}", e))
            })?;

        if let Some(port) = session.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(Self {
            session,
            download_path,
            metadata_timeout_secs: config.metadata_timeout_secs,
            tracks: RwLock::new(HashMap::new()),
        })
    }

    /// Format info hash as lowercase hex string.
    fn format_hash(hash: &librqbit_core::Id20) -> String {
        hash.as_string()
    }

    /// Find a torrent by hash.
    fn find_torrent(&self, id: &str) -> Option<Arc<ManagedTorrent>> {
        let id_lower = id.to_lowercase();

        self.session.with_torrents(|iter| {
            for (_, torrent) in iter {
                if Self::format_hash(&torrent.info_hash()) == id_lower {
                    return Some(torrent.clone());
                }
            }
            None
        })
    }

    /// Convert a managed torrent's live state into `TorrentStats`.
    fn torrent_stats(&self, torrent: &Arc<ManagedTorrent>, destination: Option<&str>) -> TorrentStats {
        let stats = torrent.stats();

        let name = torrent.name().map(|s| s.to_string());

        let progress = if stats.total_bytes > 0 {
            stats.progress_bytes as f64 / stats.total_bytes as f64
        } else {
            0.0
        };

        let (download_speed, upload_speed, seeds, peers) = stats
            .live
            .as_ref()
            .map(|live| {
                // Despite the field name "mbps", librqbit stores MiB/s, as
                // its Display impl shows. Convert to bytes/sec.
                let dl_speed = (live.download_speed.mbps * 1024.0 * 1024.0) as u64;
                let ul_speed = (live.upload_speed.mbps * 1024.0 * 1024.0) as u64;

                let total_peers = live.snapshot.peer_stats.queued
                    + live.snapshot.peer_stats.connecting
                    + live.snapshot.peer_stats.live;

                (
                    dl_speed,
                    ul_speed,
                    live.snapshot.peer_stats.live as u32,
                    total_peers as u32,
                )
            })
            .unwrap_or((0, 0, 0, 0));

        let error = match &stats.state {
            librqbit::TorrentStatsState::Error => Some(
                stats
                    .error
                    .clone()
                    .unwrap_or_else(|| "engine error".to_string()),
            ),
            _ => None,
        };

        let eta_secs = if !stats.finished && download_speed > 0 {
            let remaining = stats.total_bytes.saturating_sub(stats.progress_bytes);
            Some(remaining / download_speed)
        } else {
            None
        };

        // librqbit does not expose swarm piece availability; a connected
        // seed means at least one full copy.
        let availability = if stats.finished {
            1.0
        } else {
            seeds as f64 + progress
        };

        TorrentStats {
            name,
            progress,
            total_bytes: stats.total_bytes,
            downloaded_bytes: stats.progress_bytes,
            uploaded_bytes: stats.uploaded_bytes,
            download_speed,
            upload_speed,
            peers,
            seeds,
            availability,
            eta_secs,
            finished: stats.finished,
            paused: torrent.is_paused(),
            error,
            save_path: destination
                .map(String::from)
                .or_else(|| Some(self.download_path.display().to_string())),
        }
    }

    async fn attach_inner(
        &self,
        add: RqbitAddTorrent<'static>,
        destination: Option<String>,
        paused: bool,
    ) -> Result<AttachResult, EngineError> {
        let opts = AddTorrentOptions {
            paused,
            output_folder: destination.clone(),
            ..Default::default()
        };

        // DHT metadata lookup for rare magnets can take arbitrarily long.
        let add_future = self.session.add_torrent(add, Some(opts));
        let response = tokio::time::timeout(
            std::time::Duration::from_secs(self.metadata_timeout_secs),
            add_future,
        )
        .await
        .map_err(|_| EngineError::Timeout)?
        .map_err(|e| EngineError::AttachRejected(format!("{}", e)))?;

        let handle = match response {
            AddTorrentResponse::Added(_, handle) => handle,
            AddTorrentResponse::AlreadyManaged(_, handle) => {
                warn!(hash = %Self::format_hash(&handle.info_hash()), "Torrent already attached");
                handle
            }
            AddTorrentResponse::ListOnly(_) => {
                return Err(EngineError::AttachRejected(
                    "torrent was added in list-only mode".to_string(),
                ));
            }
        };

        let id = Self::format_hash(&handle.info_hash());
        let name = handle.name().map(|s| s.to_string());

        self.tracks.write().await.insert(
            id.clone(),
            AlertTrack {
                destination,
                ..Default::default()
            },
        );

        debug!(hash = %id, name = ?name, "Torrent attached");

        Ok(AttachResult { id, name })
    }
}

#[async_trait]
impl TorrentEngine for LibrqbitEngine {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn attach(&self, request: AttachRequest) -> Result<AttachResult, EngineError> {
        match request {
            AttachRequest::Magnet {
                uri,
                destination,
                paused,
            } => {
                self.attach_inner(RqbitAddTorrent::from_url(uri), destination, paused)
                    .await
            }
            AttachRequest::TorrentFile {
                data,
                destination,
                paused,
                ..
            } => {
                self.attach_inner(RqbitAddTorrent::from_bytes(data), destination, paused)
                    .await
            }
        }
    }

    async fn detach(&self, id: &str, delete_files: bool) -> Result<(), EngineError> {
        let torrent = self
            .find_torrent(id)
            .ok_or_else(|| EngineError::NotAttached(id.to_string()))?;

        self.session
            .delete(torrent.id().into(), delete_files)
            .await
            .map_err(|e| EngineError::Internal(format!("failed to detach torrent: {}", e)))?;

        self.tracks.write().await.remove(id);

        debug!(hash = %id, delete_files = delete_files, "Torrent detached");

        Ok(())
    }

    async fn pause(&self, id: &str) -> Result<(), EngineError> {
        let torrent = self
            .find_torrent(id)
            .ok_or_else(|| EngineError::NotAttached(id.to_string()))?;

        self.session
            .pause(&torrent)
            .await
            .map_err(|e| EngineError::Internal(format!("failed to pause torrent: {}", e)))?;

        debug!(hash = %id, "Torrent paused");

        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), EngineError> {
        let torrent = self
            .find_torrent(id)
            .ok_or_else(|| EngineError::NotAttached(id.to_string()))?;

        self.session
            .unpause(&torrent)
            .await
            .map_err(|e| EngineError::Internal(format!("failed to resume torrent: {}", e)))?;

        debug!(hash = %id, "Torrent resumed");

        Ok(())
    }

    async fn stats(&self, id: &str) -> Result<TorrentStats, EngineError> {
        let torrent = self
            .find_torrent(id)
            .ok_or_else(|| EngineError::NotAttached(id.to_string()))?;

        let destination = self
            .tracks
            .read()
            .await
            .get(id)
            .and_then(|t| t.destination.clone());

        Ok(self.torrent_stats(&torrent, destination.as_deref()))
    }

    async fn list(&self) -> Vec<(TorrentId, TorrentStats)> {
        let torrents: Vec<Arc<ManagedTorrent>> = self
            .session
            .with_torrents(|iter| iter.map(|(_, t)| t.clone()).collect());

        let tracks = self.tracks.read().await;
        torrents
            .into_iter()
            .map(|torrent| {
                let id = Self::format_hash(&torrent.info_hash());
                let destination = tracks.get(&id).and_then(|t| t.destination.clone());
                let stats = self.torrent_stats(&torrent, destination.as_deref());
                (id, stats)
            })
            .collect()
    }

    async fn poll_alerts(&self) -> Vec<EngineAlert> {
        let torrents: Vec<Arc<ManagedTorrent>> = self
            .session
            .with_torrents(|iter| iter.map(|(_, t)| t.clone()).collect());

        let mut alerts = Vec::new();
        let mut tracks = self.tracks.write().await;

        for torrent in torrents {
            let id = Self::format_hash(&torrent.info_hash());
            let track = tracks.entry(id.clone()).or_default();
            let stats = self.torrent_stats(&torrent, track.destination.as_deref());

            if !track.metadata_announced {
                if let Some(ref name) = stats.name {
                    track.metadata_announced = true;
                    alerts.push(EngineAlert::MetadataResolved {
                        id: id.clone(),
                        name: name.clone(),
                        total_bytes: stats.total_bytes,
                    });
                }
            }

            if let Some(ref message) = stats.error {
                if !track.failed_announced {
                    track.failed_announced = true;
                    alerts.push(EngineAlert::Failed {
                        id: id.clone(),
                        message: message.clone(),
                    });
                }
                continue;
            }
            track.failed_announced = false;

            if stats.finished && !track.completed_announced {
                track.completed_announced = true;
                alerts.push(EngineAlert::StatusUpdate {
                    id: id.clone(),
                    stats: stats.clone(),
                });
                alerts.push(EngineAlert::Completed { id: id.clone() });
                continue;
            }

            if !stats.paused && !stats.finished {
                alerts.push(EngineAlert::StatusUpdate {
                    id: id.clone(),
                    stats,
                });
            }
        }

        alerts
    }

    async fn set_limits(&self, download_kbs: u64, upload_kbs: u64) -> Result<(), EngineError> {
        // librqbit applies rate limits at session construction; live
        // reconfiguration is not supported, so this is acknowledged only.
        warn!(
            download_kbs = download_kbs,
            upload_kbs = upload_kbs,
            "Live bandwidth limits not supported by librqbit"
        );
        Ok(())
    }

    async fn save_state(&self) -> Result<Vec<u8>, EngineError> {
        let tracks = self.tracks.read().await;

        let torrents: Vec<Arc<ManagedTorrent>> = self
            .session
            .with_torrents(|iter| iter.map(|(_, t)| t.clone()).collect());

        let entries: Vec<ResumeEntry> = torrents
            .iter()
            .map(|torrent| {
                let id = Self::format_hash(&torrent.info_hash());
                ResumeEntry {
                    magnet: format!("magnet:?xt=urn:btih:{}", id),
                    name: torrent.name().map(|s| s.to_string()),
                    destination: tracks.get(&id).and_then(|t| t.destination.clone()),
                    paused: torrent.is_paused(),
                }
            })
            .collect();

        serde_json::to_vec(&entries)
            .map_err(|e| EngineError::Internal(format!("failed to serialize session: {}", e)))
    }

    async fn load_state(&self, blob: &[u8]) -> Result<Vec<RestoredTorrent>, EngineError> {
        if blob.is_empty() {
            return Ok(Vec::new());
        }

        let entries: Vec<ResumeEntry> = serde_json::from_slice(blob)
            .map_err(|e| EngineError::StateCorrupt(e.to_string()))?;

        let mut restored = Vec::new();
        for entry in entries {
            let request = AttachRequest::Magnet {
                uri: entry.magnet.clone(),
                destination: entry.destination.clone(),
                paused: entry.paused,
            };

            match self.attach(request).await {
                Ok(result) => restored.push(RestoredTorrent {
                    id: result.id,
                    name: result.name.or(entry.name),
                    destination: entry.destination,
                    paused: entry.paused,
                }),
                Err(e) => {
                    warn!(magnet = %entry.magnet, error = %e, "Failed to restore torrent");
                }
            }
        }

        info!(count = restored.len(), "Session state restored");

        Ok(restored)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Stopping librqbit session");
        self.session.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_entry_round_trip() {
        let entries = vec![ResumeEntry {
            magnet: "magnet:?xt=urn:btih:abc".to_string(),
            name: Some("test".to_string()),
            destination: Some("/dl".to_string()),
            paused: true,
        }];

        let blob = serde_json::to_vec(&entries).unwrap();
        let parsed: Vec<ResumeEntry> = serde_json::from_slice(&blob).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].magnet, "magnet:?xt=urn:btih:abc");
        assert!(parsed[0].paused);
    }

    #[test]
    fn test_corrupt_blob_is_rejected() {
        let result: Result<Vec<ResumeEntry>, _> = serde_json::from_slice(b"not json");
        assert!(result.is_err());
    }
}
