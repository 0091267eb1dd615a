//! Mock torrent engine for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::engine::{
    AttachRequest, AttachResult, EngineAlert, EngineError, RestoredTorrent, TorrentEngine,
    TorrentId, TorrentStats,
};

/// A recorded attach call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedAttach {
    pub request: AttachRequest,
    pub timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct MockTorrent {
    name: String,
    stats: TorrentStats,
    destination: Option<String>,
    source_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MockStateEntry {
    id: TorrentId,
    name: String,
    destination: Option<String>,
    paused: bool,
    source_uri: Option<String>,
}

/// Mock implementation of the `TorrentEngine` trait.
///
/// Provides controllable behavior for testing:
/// - Track attach calls for assertions
/// - Drive progress, completion and failure, emitting matching alerts
/// - Inject errors into the next operation
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockTorrentEngine::new();
///
/// let result = engine
///     .attach(AttachRequest::magnet("magnet:?xt=urn:btih:abc"))
///     .await?;
///
/// engine.set_progress(&result.id, 0.5).await;
/// engine.complete(&result.id).await;
///
/// let alerts = engine.poll_alerts().await;
/// assert!(alerts.iter().any(|a| matches!(a, EngineAlert::Completed { .. })));
/// ```
#[derive(Debug)]
pub struct MockTorrentEngine {
    attached: Arc<RwLock<Vec<RecordedAttach>>>,
    torrents: Arc<RwLock<HashMap<TorrentId, MockTorrent>>>,
    alerts: Arc<RwLock<VecDeque<EngineAlert>>>,
    next_error: Arc<RwLock<Option<EngineError>>>,
    limits: Arc<RwLock<Option<(u64, u64)>>>,
    id_counter: Arc<RwLock<u32>>,
}

impl Default for MockTorrentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentEngine {
    pub fn new() -> Self {
        Self {
            attached: Arc::new(RwLock::new(Vec::new())),
            torrents: Arc::new(RwLock::new(HashMap::new())),
            alerts: Arc::new(RwLock::new(VecDeque::new())),
            next_error: Arc::new(RwLock::new(None)),
            limits: Arc::new(RwLock::new(None)),
            id_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Get all recorded attach calls.
    pub async fn attach_calls(&self) -> Vec<RecordedAttach> {
        self.attached.read().await.clone()
    }

    /// Number of torrents currently attached.
    pub async fn attached_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    /// Check whether a torrent is attached.
    pub async fn is_attached(&self, id: &str) -> bool {
        self.torrents.read().await.contains_key(id)
    }

    /// Overwrite the stats reported for a torrent.
    pub async fn set_stats(&self, id: &str, stats: TorrentStats) {
        let mut torrents = self.torrents.write().await;
        if let Some(torrent) = torrents.get_mut(id) {
            torrent.stats = stats;
        }
    }

    /// Drive progress (0.0 to 1.0) and queue a status update alert.
    pub async fn set_progress(&self, id: &str, progress: f64) {
        let stats = {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(id) {
                Some(torrent) => {
                    let progress = progress.clamp(0.0, 1.0);
                    torrent.stats.progress = progress;
                    torrent.stats.downloaded_bytes =
                        (torrent.stats.total_bytes as f64 * progress) as u64;
                    torrent.stats.clone()
                }
                None => return,
            }
        };
        self.alerts.write().await.push_back(EngineAlert::StatusUpdate {
            id: id.to_string(),
            stats,
        });
    }

    /// Mark a torrent finished and queue the matching alerts.
    pub async fn complete(&self, id: &str) {
        let stats = {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(id) {
                Some(torrent) => {
                    torrent.stats.progress = 1.0;
                    torrent.stats.downloaded_bytes = torrent.stats.total_bytes;
                    torrent.stats.finished = true;
                    torrent.stats.download_speed = 0;
                    torrent.stats.eta_secs = None;
                    torrent.stats.clone()
                }
                None => return,
            }
        };
        let mut alerts = self.alerts.write().await;
        alerts.push_back(EngineAlert::StatusUpdate {
            id: id.to_string(),
            stats,
        });
        alerts.push_back(EngineAlert::Completed { id: id.to_string() });
    }

    /// Put a torrent into the error state and queue a failure alert.
    pub async fn fail(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(id) {
                Some(torrent) => {
                    torrent.stats.error = Some(message.clone());
                    torrent.stats.download_speed = 0;
                }
                None => return,
            }
        }
        self.alerts.write().await.push_back(EngineAlert::Failed {
            id: id.to_string(),
            message,
        });
    }

    /// Announce resolved metadata for a magnet and queue the alert.
    pub async fn resolve_metadata(&self, id: &str, name: impl Into<String>, total_bytes: u64) {
        let name = name.into();
        {
            let mut torrents = self.torrents.write().await;
            match torrents.get_mut(id) {
                Some(torrent) => {
                    torrent.name = name.clone();
                    torrent.stats.name = Some(name.clone());
                    torrent.stats.total_bytes = total_bytes;
                }
                None => return,
            }
        }
        self.alerts
            .write()
            .await
            .push_back(EngineAlert::MetadataResolved {
                id: id.to_string(),
                name,
                total_bytes,
            });
    }

    /// Queue an arbitrary alert.
    pub async fn push_alert(&self, alert: EngineAlert) {
        self.alerts.write().await.push_back(alert);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Last limits passed to `set_limits`, if any.
    pub async fn applied_limits(&self) -> Option<(u64, u64)> {
        *self.limits.read().await
    }

    async fn take_error(&self) -> Option<EngineError> {
        self.next_error.write().await.take()
    }

    async fn generate_id(&self) -> TorrentId {
        let mut counter = self.id_counter.write().await;
        *counter += 1;
        format!("mock{:08x}", *counter)
    }

    /// Extract the info hash from a magnet URI if present.
    fn extract_hash_from_magnet(uri: &str) -> Option<String> {
        uri.split(&['?', '&'][..])
            .find(|part| part.starts_with("xt=urn:btih:"))
            .and_then(|part| part.strip_prefix("xt=urn:btih:"))
            .map(|h| h.to_lowercase())
    }

    async fn insert_torrent(
        &self,
        id: TorrentId,
        name: String,
        destination: Option<String>,
        paused: bool,
        source_uri: Option<String>,
    ) {
        let stats = TorrentStats {
            name: Some(name.clone()),
            total_bytes: 100 * 1024 * 1024,
            download_speed: if paused { 0 } else { 1024 * 1024 },
            upload_speed: if paused { 0 } else { 256 * 1024 },
            peers: 5,
            seeds: 10,
            availability: 10.0,
            eta_secs: Some(100),
            paused,
            save_path: destination.clone(),
            ..TorrentStats::default()
        };
        self.torrents.write().await.insert(
            id,
            MockTorrent {
                name,
                stats,
                destination,
                source_uri,
            },
        );
    }
}

#[async_trait]
impl TorrentEngine for MockTorrentEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn attach(&self, request: AttachRequest) -> Result<AttachResult, EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        self.attached.write().await.push(RecordedAttach {
            request: request.clone(),
            timestamp: Utc::now(),
        });

        let (id, name, source_uri) = match &request {
            AttachRequest::Magnet { uri, .. } => {
                let id = match Self::extract_hash_from_magnet(uri) {
                    Some(hash) => hash,
                    None => self.generate_id().await,
                };
                let prefix = if id.len() >= 8 { &id[..8] } else { id.as_str() };
                (id.clone(), format!("Mock Torrent {prefix}"), Some(uri.clone()))
            }
            AttachRequest::TorrentFile { filename, .. } => {
                let id = self.generate_id().await;
                let name = filename
                    .clone()
                    .unwrap_or_else(|| format!("Mock Torrent {id}"));
                (id, name, None)
            }
        };

        let destination = request.destination().map(String::from);
        let paused = request.paused();
        self.insert_torrent(id.clone(), name.clone(), destination, paused, source_uri)
            .await;

        Ok(AttachResult {
            id,
            name: Some(name),
        })
    }

    async fn detach(&self, id: &str, _delete_files: bool) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if self.torrents.write().await.remove(id).is_some() {
            Ok(())
        } else {
            Err(EngineError::NotAttached(id.to_string()))
        }
    }

    async fn pause(&self, id: &str) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let mut torrents = self.torrents.write().await;
        match torrents.get_mut(id) {
            Some(torrent) => {
                torrent.stats.paused = true;
                torrent.stats.download_speed = 0;
                torrent.stats.upload_speed = 0;
                Ok(())
            }
            None => Err(EngineError::NotAttached(id.to_string())),
        }
    }

    async fn resume(&self, id: &str) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let mut torrents = self.torrents.write().await;
        match torrents.get_mut(id) {
            Some(torrent) => {
                torrent.stats.paused = false;
                if !torrent.stats.finished {
                    torrent.stats.download_speed = 1024 * 1024;
                    torrent.stats.upload_speed = 256 * 1024;
                }
                Ok(())
            }
            None => Err(EngineError::NotAttached(id.to_string())),
        }
    }

    async fn stats(&self, id: &str) -> Result<TorrentStats, EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        self.torrents
            .read()
            .await
            .get(id)
            .map(|t| t.stats.clone())
            .ok_or_else(|| EngineError::NotAttached(id.to_string()))
    }

    async fn list(&self) -> Vec<(TorrentId, TorrentStats)> {
        let torrents = self.torrents.read().await;
        torrents
            .iter()
            .map(|(id, t)| (id.clone(), t.stats.clone()))
            .collect()
    }

    async fn poll_alerts(&self) -> Vec<EngineAlert> {
        self.alerts.write().await.drain(..).collect()
    }

    async fn set_limits(&self, download_kbs: u64, upload_kbs: u64) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        *self.limits.write().await = Some((download_kbs, upload_kbs));
        Ok(())
    }

    async fn save_state(&self) -> Result<Vec<u8>, EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let torrents = self.torrents.read().await;
        let entries: Vec<MockStateEntry> = torrents
            .iter()
            .map(|(id, t)| MockStateEntry {
                id: id.clone(),
                name: t.name.clone(),
                destination: t.destination.clone(),
                paused: t.stats.paused,
                source_uri: t.source_uri.clone(),
            })
            .collect();
        serde_json::to_vec(&entries).map_err(|e| EngineError::Internal(e.to_string()))
    }

    async fn load_state(&self, blob: &[u8]) -> Result<Vec<RestoredTorrent>, EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        let entries: Vec<MockStateEntry> = serde_json::from_slice(blob)
            .map_err(|e| EngineError::StateCorrupt(e.to_string()))?;
        let mut restored = Vec::with_capacity(entries.len());
        for entry in entries {
            self.insert_torrent(
                entry.id.clone(),
                entry.name.clone(),
                entry.destination.clone(),
                entry.paused,
                entry.source_uri,
            )
            .await;
            restored.push(RestoredTorrent {
                id: entry.id,
                name: Some(entry.name),
                destination: entry.destination,
                paused: entry.paused,
            });
        }
        Ok(restored)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.torrents.write().await.clear();
        self.alerts.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_extracts_magnet_hash() {
        let engine = MockTorrentEngine::new();
        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:abc123def456"))
            .await
            .unwrap();
        assert_eq!(result.id, "abc123def456");
        assert!(engine.is_attached(&result.id).await);
    }

    #[tokio::test]
    async fn test_torrent_file_gets_generated_id() {
        let engine = MockTorrentEngine::new();
        let result = engine
            .attach(AttachRequest::torrent_file(vec![1, 2, 3]).with_filename("movie.torrent"))
            .await
            .unwrap();
        assert!(result.id.starts_with("mock"));
        assert_eq!(result.name.as_deref(), Some("movie.torrent"));
    }

    #[tokio::test]
    async fn test_progress_and_completion_alerts() {
        let engine = MockTorrentEngine::new();
        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:progress1"))
            .await
            .unwrap();

        engine.set_progress(&result.id, 0.5).await;
        engine.complete(&result.id).await;

        let alerts = engine.poll_alerts().await;
        assert_eq!(alerts.len(), 3);
        assert!(matches!(alerts[0], EngineAlert::StatusUpdate { .. }));
        assert!(matches!(alerts[2], EngineAlert::Completed { .. }));

        // Queue drains on poll.
        assert!(engine.poll_alerts().await.is_empty());

        let stats = engine.stats(&result.id).await.unwrap();
        assert!(stats.finished);
        assert_eq!(stats.progress, 1.0);
    }

    #[tokio::test]
    async fn test_error_injection_consumed_once() {
        let engine = MockTorrentEngine::new();
        engine
            .set_next_error(EngineError::InitFailed("boom".to_string()))
            .await;

        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:err1"))
            .await;
        assert!(result.is_err());

        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:ok1"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let engine = MockTorrentEngine::new();
        engine
            .attach(
                AttachRequest::magnet("magnet:?xt=urn:btih:saved1")
                    .with_destination("/dl/one"),
            )
            .await
            .unwrap();
        engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:saved2").with_paused(true))
            .await
            .unwrap();

        let blob = engine.save_state().await.unwrap();

        let fresh = MockTorrentEngine::new();
        let restored = fresh.load_state(&blob).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(fresh.attached_count().await, 2);

        let paused = restored.iter().find(|r| r.id == "saved2").unwrap();
        assert!(paused.paused);
    }

    #[tokio::test]
    async fn test_load_state_rejects_garbage() {
        let engine = MockTorrentEngine::new();
        let result = engine.load_state(b"not json").await;
        assert!(matches!(result, Err(EngineError::StateCorrupt(_))));
    }

    #[tokio::test]
    async fn test_pause_resume() {
        let engine = MockTorrentEngine::new();
        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:pauseme"))
            .await
            .unwrap();

        engine.pause(&result.id).await.unwrap();
        let stats = engine.stats(&result.id).await.unwrap();
        assert!(stats.paused);
        assert_eq!(stats.download_speed, 0);

        engine.resume(&result.id).await.unwrap();
        let stats = engine.stats(&result.id).await.unwrap();
        assert!(!stats.paused);
        assert!(stats.download_speed > 0);
    }

    #[tokio::test]
    async fn test_detach_unknown_errors() {
        let engine = MockTorrentEngine::new();
        let result = engine.detach("ghost", false).await;
        assert!(matches!(result, Err(EngineError::NotAttached(_))));
    }

    #[tokio::test]
    async fn test_metadata_resolution() {
        let engine = MockTorrentEngine::new();
        let result = engine
            .attach(AttachRequest::magnet("magnet:?xt=urn:btih:meta1"))
            .await
            .unwrap();

        engine
            .resolve_metadata(&result.id, "Some.Movie.2024", 700 * 1024 * 1024)
            .await;

        let alerts = engine.poll_alerts().await;
        assert!(alerts.iter().any(|a| matches!(
            a,
            EngineAlert::MetadataResolved { name, .. } if name == "Some.Movie.2024"
        )));

        let stats = engine.stats(&result.id).await.unwrap();
        assert_eq!(stats.name.as_deref(), Some("Some.Movie.2024"));
        assert_eq!(stats.total_bytes, 700 * 1024 * 1024);
    }
}
