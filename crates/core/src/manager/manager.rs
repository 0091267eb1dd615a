//! The torrent download manager.
//!
//! Owns the catalog of managed torrents and drives them through their
//! lifecycle: source resolution, gated admission to the engine, alert
//! polling, archive extraction, notifications and session persistence.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{AttachRequest, EngineAlert, EngineError, TorrentEngine, TorrentId};
use crate::extract::ArchiveExtractor;
use crate::health::{HealthChecker, TorrentHealthReport};
use crate::journal::{LogLevel, LogStep, TorrentLogEntry, TorrentLogRecorder};
use crate::metrics;
use crate::session::{SessionStateError, SessionStateStore};

use super::gate::ConcurrencyGate;
use super::listener::{ListenerSet, TorrentNotificationListener};
use super::types::{ManagerError, ManagerSettings, TorrentState, TorrentStatus};

/// Timeout for fetching a `.torrent` file over HTTP.
const TORRENT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Magnet URIs must carry a btih info hash (40 hex or 32 base32 chars).
static MAGNET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^magnet:\?.*xt=urn:btih:([0-9a-fA-F]{40}|[0-9A-Za-z]{32})")
        .unwrap()
});

/// How a torrent source attaches to the engine, resolved at add time.
#[derive(Clone)]
enum AttachPayload {
    Magnet(String),
    Bytes {
        data: Vec<u8>,
        filename: Option<String>,
    },
}

struct DownloadEntry {
    state: TorrentState,
    payload: AttachPayload,
}

/// The torrent download manager.
///
/// Cheap to clone; all state is shared. Synchronous validation errors come
/// back through `Result`; failures that happen after admission surface as
/// an `Error` status plus journal entries and listener callbacks.
#[derive(Clone)]
pub struct TorrentDownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    engine: Arc<dyn TorrentEngine>,
    settings: RwLock<ManagerSettings>,
    poll_interval_ms: u64,
    min_free_disk_bytes: u64,
    download_root: PathBuf,

    catalog: RwLock<HashMap<String, DownloadEntry>>,
    by_id: RwLock<HashMap<TorrentId, String>>,
    waiting: Mutex<VecDeque<String>>,
    gate: ConcurrencyGate,
    journal: TorrentLogRecorder,
    listeners: ListenerSet,
    extractor: Arc<ArchiveExtractor>,
    health: HealthChecker,
    session: SessionStateStore,
    extraction_tasks: Mutex<HashMap<String, JoinHandle<()>>>,

    running: AtomicBool,
    disk_low: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl TorrentDownloadManager {
    pub fn new(config: &Config, engine: Arc<dyn TorrentEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let settings = ManagerSettings::from(&config.manager);

        Self {
            inner: Arc::new(ManagerInner {
                session: SessionStateStore::new(Arc::clone(&engine)),
                engine,
                gate: ConcurrencyGate::new(settings.max_concurrent_downloads),
                settings: RwLock::new(settings),
                poll_interval_ms: config.manager.poll_interval_ms,
                min_free_disk_bytes: config.manager.min_free_disk_bytes,
                download_root: PathBuf::from(&config.engine.download_path),
                catalog: RwLock::new(HashMap::new()),
                by_id: RwLock::new(HashMap::new()),
                waiting: Mutex::new(VecDeque::new()),
                journal: TorrentLogRecorder::with_capacity(config.manager.journal_capacity),
                listeners: ListenerSet::new(),
                extractor: Arc::new(ArchiveExtractor::new(config.extractor.clone())),
                health: HealthChecker::new(config.manager.min_free_disk_bytes),
                extraction_tasks: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                disk_low: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Register a notification listener. Listeners added after `start` see
    /// only events from that point on.
    pub fn add_listener(&self, listener: Arc<dyn TorrentNotificationListener>) {
        self.inner.listeners.add(listener);
    }

    /// Start the background poll loop.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Download manager already running");
            return;
        }

        info!(
            engine = self.inner.engine.name(),
            poll_interval_ms = self.inner.poll_interval_ms,
            "Starting download manager"
        );

        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!("Manager poll loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Manager poll loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(inner.poll_interval_ms)) => {
                        if !inner.running.load(Ordering::Relaxed) {
                            break;
                        }
                        inner.drain_alerts().await;
                        inner.check_disk_space().await;
                    }
                }
            }
            debug!("Manager poll loop stopped");
        });
    }

    /// Stop the poll loop and shut the engine down. Idempotent.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("Download manager already stopped");
            return;
        }

        info!("Stopping download manager");
        let _ = self.inner.shutdown_tx.send(());

        let mut tasks = self.inner.extraction_tasks.lock().await;
        for (source, task) in tasks.drain() {
            debug!(source = %source, "Aborting extraction task on shutdown");
            task.abort();
        }
        drop(tasks);

        if let Err(e) = self.inner.engine.shutdown().await {
            warn!(error = %e, "Engine shutdown reported an error");
        }
        info!("Download manager stopped");
    }

    /// Add a torrent by source: a magnet URI, an `http(s)` URL to a
    /// `.torrent` file, or a local `.torrent` path.
    ///
    /// The torrent starts `Waiting` and goes through the concurrency gate
    /// immediately when a slot is free; `auto_start` only governs promotion
    /// of the queue when a slot frees up later. Adding a source already in
    /// the catalog returns its current snapshot.
    pub async fn add_torrent(&self, source: &str) -> Result<TorrentState, ManagerError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ManagerError::InvalidSource("empty source".to_string()));
        }

        if let Some(existing) = self.snapshot(source).await {
            debug!(source = %source, "Torrent already managed");
            return Ok(existing);
        }

        let payload = self.inner.resolve_source(source).await?;
        self.inner.ensure_destination().await?;
        self.inner.enqueue(source, payload).await;
        self.inner.force_start(source).await;

        self.snapshot(source)
            .await
            .ok_or_else(|| ManagerError::UnknownTorrent(source.to_string()))
    }

    /// Add a torrent from raw `.torrent` file contents.
    pub async fn download_torrent_file(
        &self,
        data: Vec<u8>,
        filename: Option<String>,
    ) -> Result<TorrentState, ManagerError> {
        if data.is_empty() {
            return Err(ManagerError::InvalidSource(
                "empty torrent file".to_string(),
            ));
        }

        let source = filename
            .clone()
            .unwrap_or_else(|| format!("torrent-file-{}", chrono::Utc::now().timestamp_millis()));

        if let Some(existing) = self.snapshot(&source).await {
            return Ok(existing);
        }

        self.inner.ensure_destination().await?;
        self.inner
            .enqueue(&source, AttachPayload::Bytes { data, filename })
            .await;
        self.inner.force_start(&source).await;

        self.snapshot(&source)
            .await
            .ok_or_else(|| ManagerError::UnknownTorrent(source))
    }

    /// Pause a download. Active downloads release their gate slot; waiting
    /// ones leave the queue. Paused/completed/errored torrents are left
    /// untouched.
    pub async fn pause_download(&self, source: &str) -> Result<(), ManagerError> {
        self.inner.pause(source, "Paused by user").await
    }

    /// Resume a paused download, or force-start a waiting one.
    ///
    /// If the gate is full the torrent goes back to `Waiting` instead of
    /// sticking in `Paused`.
    pub async fn resume_download(&self, source: &str) -> Result<(), ManagerError> {
        self.inner.resume(source).await
    }

    /// Remove a torrent from the manager. A no-op when the source is not
    /// in the catalog.
    pub async fn remove_download(
        &self,
        source: &str,
        delete_files: bool,
    ) -> Result<(), ManagerError> {
        self.inner.remove(source, delete_files).await
    }

    /// Re-queue an errored torrent. Progress resets to zero and the torrent
    /// goes back through the gate as `Waiting`.
    pub async fn retry_download(&self, source: &str) -> Result<(), ManagerError> {
        self.inner.retry(source).await
    }

    /// Apply new settings: gate limit, bandwidth caps, extraction and
    /// auto-start toggles. Lowering the gate limit never evicts active
    /// downloads.
    pub async fn update_config(&self, settings: ManagerSettings) {
        info!(
            max_concurrent = settings.max_concurrent_downloads,
            download_limit_kbs = settings.download_limit_kbs,
            upload_limit_kbs = settings.upload_limit_kbs,
            "Applying manager settings"
        );

        self.inner
            .gate
            .set_limit(settings.max_concurrent_downloads)
            .await;

        if let Err(e) = self
            .inner
            .engine
            .set_limits(settings.download_limit_kbs, settings.upload_limit_kbs)
            .await
        {
            warn!(error = %e, "Failed to apply bandwidth limits");
        }

        *self.inner.settings.write().await = settings;
        self.inner.promote_waiting().await;
    }

    /// Diagnostic journal for a torrent, oldest first.
    pub async fn torrent_log(&self, source: &str) -> Vec<TorrentLogEntry> {
        self.inner.journal.entries_for(source)
    }

    /// Run the health battery against a torrent. Returns `None` for
    /// torrents not attached to the engine.
    pub async fn run_health_check(&self, source: &str) -> Option<TorrentHealthReport> {
        let (id, destination) = {
            let catalog = self.inner.catalog.read().await;
            let entry = catalog.get(source)?;
            (
                entry.state.torrent_id.clone()?,
                PathBuf::from(&entry.state.destination_path),
            )
        };
        Some(
            self.inner
                .health
                .check(self.inner.engine.as_ref(), &id, &destination)
                .await,
        )
    }

    /// Snapshot the engine's resumable state as an opaque blob.
    pub async fn save_session_state(&self) -> Result<Vec<u8>, ManagerError> {
        Ok(self.inner.session.snapshot().await?)
    }

    /// Restore a previously saved session.
    ///
    /// An empty blob starts a fresh session; a corrupt blob is logged and
    /// also starts fresh, never failing the caller. Restored torrents that
    /// do not fit through the gate are paused and queued.
    pub async fn restore_session_state(&self, blob: &[u8]) {
        let restored = match self.inner.session.restore(blob).await {
            Ok(restored) => {
                let label = if restored.is_empty() { "fresh" } else { "restored" };
                metrics::SESSION_RESTORES.with_label_values(&[label]).inc();
                restored
            }
            Err(e @ SessionStateError::Corrupt(_))
            | Err(e @ SessionStateError::UnsupportedVersion { .. }) => {
                warn!(error = %e, "Session state unusable, starting fresh");
                metrics::SESSION_RESTORES.with_label_values(&["corrupt"]).inc();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Session restore failed, starting fresh");
                metrics::SESSION_RESTORES.with_label_values(&["corrupt"]).inc();
                return;
            }
        };

        for torrent in restored {
            self.inner.adopt_restored(torrent).await;
        }
        self.inner.promote_waiting().await;
    }

    /// Snapshot of one torrent's public state.
    pub async fn snapshot(&self, source: &str) -> Option<TorrentState> {
        self.inner
            .catalog
            .read()
            .await
            .get(source)
            .map(|entry| entry.state.clone())
    }

    /// Snapshots of every managed torrent, oldest first.
    pub async fn list(&self) -> Vec<TorrentState> {
        let catalog = self.inner.catalog.read().await;
        let mut states: Vec<TorrentState> =
            catalog.values().map(|entry| entry.state.clone()).collect();
        states.sort_by(|a, b| a.added_at.cmp(&b.added_at));
        states
    }
}

impl ManagerInner {
    /// Classify and resolve a torrent source into an attach payload.
    async fn resolve_source(&self, source: &str) -> Result<AttachPayload, ManagerError> {
        if source.starts_with("magnet:") {
            if !MAGNET_RE.is_match(source) {
                return Err(ManagerError::InvalidSource(format!(
                    "magnet URI missing btih info hash: {source}"
                )));
            }
            return Ok(AttachPayload::Magnet(source.to_string()));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            let data = fetch_torrent_file(source).await?;
            let filename = source.rsplit('/').next().map(String::from);
            return Ok(AttachPayload::Bytes { data, filename });
        }

        if source.to_lowercase().ends_with(".torrent") {
            let data = tokio::fs::read(source).await.map_err(|e| {
                ManagerError::InvalidSource(format!("cannot read torrent file {source}: {e}"))
            })?;
            let filename = Path::new(source)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            return Ok(AttachPayload::Bytes { data, filename });
        }

        Err(ManagerError::InvalidSource(format!(
            "not a magnet URI, URL or .torrent path: {source}"
        )))
    }

    /// Make sure the download root exists and is usable.
    async fn ensure_destination(&self) -> Result<(), ManagerError> {
        tokio::fs::create_dir_all(&self.download_root)
            .await
            .map_err(|e| {
                ManagerError::InvalidDestination(format!(
                    "{}: {e}",
                    self.download_root.display()
                ))
            })
    }

    /// Insert a fresh `Waiting` entry and queue it.
    async fn enqueue(&self, source: &str, payload: AttachPayload) {
        let mut state = TorrentState::new(source, self.download_root.to_string_lossy());
        if let AttachPayload::Bytes {
            filename: Some(name),
            ..
        } = &payload
        {
            state.name = name.clone();
            state.file_name = Some(name.clone());
        }

        self.catalog
            .write()
            .await
            .insert(source.to_string(), DownloadEntry { state, payload });
        self.waiting.lock().await.push_back(source.to_string());
        self.journal
            .record(source, LogStep::Added, LogLevel::Info, "Torrent added");
        info!(source = %source, "Torrent added to catalog");
    }

    /// Start waiting torrents while gate slots are free, respecting
    /// `auto_start`. Suspended entirely while the disk watchdog holds the
    /// low-space latch; promoting against a full disk would undo the
    /// protective pauses one tick later.
    async fn promote_waiting(&self) {
        if self.disk_low.load(Ordering::Relaxed) {
            return;
        }
        if !self.settings.read().await.auto_start {
            return;
        }
        loop {
            let Some(source) = self.waiting.lock().await.pop_front() else {
                break;
            };
            if !self.gate.try_admit(&source).await {
                self.waiting.lock().await.push_front(source);
                break;
            }
            self.attach_admitted(&source).await;
        }
    }

    /// Start one queued torrent now if a gate slot is free, regardless of
    /// `auto_start`. Used for fresh adds and explicit user starts; a full
    /// gate or the low-disk latch leaves it queued.
    async fn force_start(&self, source: &str) {
        if self.disk_low.load(Ordering::Relaxed) {
            return;
        }
        self.waiting.lock().await.retain(|s| s != source);
        if self.gate.try_admit(&source.to_string()).await {
            self.attach_admitted(source).await;
        } else {
            self.waiting.lock().await.push_back(source.to_string());
        }
    }

    /// Attach an already-admitted torrent to the engine.
    async fn attach_admitted(&self, source: &str) {
        let Some(payload) = ({
            let catalog = self.catalog.read().await;
            catalog.get(source).map(|entry| entry.payload.clone())
        }) else {
            // Removed while waiting.
            self.gate.release(&source.to_string()).await;
            return;
        };

        let destination = self.download_root.to_string_lossy().into_owned();
        let request = match payload {
            AttachPayload::Magnet(uri) => AttachRequest::magnet(uri),
            AttachPayload::Bytes { data, filename } => {
                let mut req = AttachRequest::torrent_file(data);
                if let Some(name) = filename {
                    req = req.with_filename(name);
                }
                req
            }
        }
        .with_destination(destination);

        self.journal.record(
            source,
            LogStep::Connecting,
            LogLevel::Info,
            "Attaching to engine",
        );

        match self.engine.attach(request).await {
            Ok(result) => {
                let mut catalog = self.catalog.write().await;
                if let Some(entry) = catalog.get_mut(source) {
                    entry.state.status = TorrentStatus::Downloading;
                    entry.state.torrent_id = Some(result.id.clone());
                    if let Some(name) = result.name {
                        entry.state.name = name;
                    }
                } else {
                    // Removed between admit and attach; detach again.
                    drop(catalog);
                    let _ = self.engine.detach(&result.id, false).await;
                    self.gate.release(&source.to_string()).await;
                    return;
                }
                drop(catalog);
                self.by_id.write().await.insert(result.id, source.to_string());
                metrics::DOWNLOADS_STARTED.inc();
                metrics::ACTIVE_DOWNLOADS.inc();
                self.journal.record(
                    source,
                    LogStep::Downloading,
                    LogLevel::Info,
                    "Download started",
                );
                info!(source = %source, "Download started");
            }
            Err(e) => {
                self.gate.release(&source.to_string()).await;
                warn!(source = %source, error = %e, "Engine rejected torrent");
                self.mark_error(source, &format!("Engine rejected torrent: {e}"))
                    .await;
            }
        }
    }

    /// Move a torrent into the `Error` state, with journal + notification.
    async fn mark_error(&self, source: &str, message: &str) {
        let snapshot = {
            let mut catalog = self.catalog.write().await;
            let Some(entry) = catalog.get_mut(source) else {
                return;
            };
            if entry.state.status == TorrentStatus::Error {
                return;
            }
            if entry.state.status == TorrentStatus::Downloading {
                metrics::ACTIVE_DOWNLOADS.dec();
            }
            entry.state.status = TorrentStatus::Error;
            entry.state.download_speed_kbs = 0;
            entry.state.upload_speed_kbs = 0;
            entry.state.clone()
        };
        self.gate.release(&source.to_string()).await;
        metrics::DOWNLOADS_FAILED.inc();
        self.journal
            .record(source, LogStep::Error, LogLevel::Error, message);
        self.listeners.notify_error(&snapshot, message);
    }

    async fn pause(&self, source: &str, reason: &str) -> Result<(), ManagerError> {
        let (status, id) = {
            let catalog = self.catalog.read().await;
            let entry = catalog
                .get(source)
                .ok_or_else(|| ManagerError::UnknownTorrent(source.to_string()))?;
            (entry.state.status, entry.state.torrent_id.clone())
        };

        match status {
            TorrentStatus::Downloading => {
                if let Some(id) = id {
                    self.engine.pause(&id).await?;
                }
                let mut catalog = self.catalog.write().await;
                if let Some(entry) = catalog.get_mut(source) {
                    entry.state.status = TorrentStatus::Paused;
                    entry.state.download_speed_kbs = 0;
                    entry.state.upload_speed_kbs = 0;
                }
                drop(catalog);
                metrics::ACTIVE_DOWNLOADS.dec();
                self.gate.release(&source.to_string()).await;
                self.journal
                    .record(source, LogStep::Paused, LogLevel::Info, reason);
                self.promote_waiting().await;
                Ok(())
            }
            TorrentStatus::Waiting => {
                self.waiting.lock().await.retain(|s| s != source);
                let mut catalog = self.catalog.write().await;
                if let Some(entry) = catalog.get_mut(source) {
                    entry.state.status = TorrentStatus::Paused;
                }
                drop(catalog);
                self.journal
                    .record(source, LogStep::Paused, LogLevel::Info, reason);
                Ok(())
            }
            // Pausing a paused/completed/errored torrent is a no-op.
            _ => Ok(()),
        }
    }

    async fn resume(&self, source: &str) -> Result<(), ManagerError> {
        let (status, id) = {
            let catalog = self.catalog.read().await;
            let entry = catalog
                .get(source)
                .ok_or_else(|| ManagerError::UnknownTorrent(source.to_string()))?;
            (entry.state.status, entry.state.torrent_id.clone())
        };

        match status {
            TorrentStatus::Paused => {
                match id {
                    Some(id) if self.gate.try_admit(&source.to_string()).await => {
                        self.engine.resume(&id).await?;
                        let mut catalog = self.catalog.write().await;
                        if let Some(entry) = catalog.get_mut(source) {
                            entry.state.status = TorrentStatus::Downloading;
                        }
                        drop(catalog);
                        metrics::ACTIVE_DOWNLOADS.inc();
                        self.journal.record(
                            source,
                            LogStep::Resumed,
                            LogLevel::Info,
                            "Download resumed",
                        );
                    }
                    _ => {
                        // Gate full, or never attached: back into the queue.
                        let mut catalog = self.catalog.write().await;
                        if let Some(entry) = catalog.get_mut(source) {
                            entry.state.status = TorrentStatus::Waiting;
                        }
                        drop(catalog);
                        self.waiting.lock().await.push_back(source.to_string());
                        self.journal.record(
                            source,
                            LogStep::Resumed,
                            LogLevel::Info,
                            "Queued for download",
                        );
                        self.promote_waiting().await;
                    }
                }
                Ok(())
            }
            TorrentStatus::Waiting => {
                // Explicit start of a queued torrent, even with auto_start off.
                self.force_start(source).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn remove(&self, source: &str, delete_files: bool) -> Result<(), ManagerError> {
        let Some(entry) = self.catalog.write().await.remove(source) else {
            debug!(source = %source, "Remove of unknown torrent ignored");
            return Ok(());
        };

        if let Some(task) = self.extraction_tasks.lock().await.remove(source) {
            task.abort();
        }
        self.waiting.lock().await.retain(|s| s != source);

        if let Some(id) = &entry.state.torrent_id {
            self.by_id.write().await.remove(id);
            match self.engine.detach(id, delete_files).await {
                Ok(()) => {}
                Err(EngineError::NotAttached(_)) => {}
                Err(e) => warn!(source = %source, error = %e, "Detach failed during remove"),
            }
        }

        if entry.state.status == TorrentStatus::Downloading {
            metrics::ACTIVE_DOWNLOADS.dec();
        }
        self.gate.release(&source.to_string()).await;
        self.journal.clear(source);
        info!(source = %source, delete_files, "Torrent removed");
        self.promote_waiting().await;
        Ok(())
    }

    async fn retry(&self, source: &str) -> Result<(), ManagerError> {
        let (status, id) = {
            let catalog = self.catalog.read().await;
            let entry = catalog
                .get(source)
                .ok_or_else(|| ManagerError::UnknownTorrent(source.to_string()))?;
            (entry.state.status, entry.state.torrent_id.clone())
        };

        if status != TorrentStatus::Error {
            return Err(ManagerError::InvalidStatus {
                expected: TorrentStatus::Error.as_str().to_string(),
                actual: status.as_str().to_string(),
            });
        }

        // Drop the failed engine attach entirely; the retry goes through a
        // fresh one.
        if let Some(id) = &id {
            self.by_id.write().await.remove(id);
            if let Err(e) = self.engine.detach(id, false).await {
                debug!(source = %source, error = %e, "Detach before retry failed");
            }
        }

        {
            let mut catalog = self.catalog.write().await;
            if let Some(entry) = catalog.get_mut(source) {
                entry.state.status = TorrentStatus::Waiting;
                entry.state.progress_percent = 0.0;
                entry.state.download_speed_kbs = 0;
                entry.state.upload_speed_kbs = 0;
                entry.state.remaining_time_seconds = super::types::REMAINING_TIME_UNKNOWN;
                entry.state.torrent_id = None;
            }
        }
        self.waiting.lock().await.push_back(source.to_string());
        self.journal.record(
            source,
            LogStep::Added,
            LogLevel::Info,
            "Retry requested, re-queued",
        );
        self.promote_waiting().await;
        Ok(())
    }

    /// Fold a torrent restored from session state into the catalog.
    async fn adopt_restored(&self, torrent: crate::engine::RestoredTorrent) {
        // The original source string did not survive the engine's blob.
        // A proper btih info hash is rebuilt into a magnet so the entry
        // can re-attach through the normal path; anything else is keyed
        // by the engine id as-is rather than by a malformed magnet.
        let candidate = format!("magnet:?xt=urn:btih:{}", torrent.id.to_lowercase());
        let source = if MAGNET_RE.is_match(&candidate) {
            candidate
        } else {
            torrent.id.clone()
        };
        if self.catalog.read().await.contains_key(&source) {
            return;
        }

        let mut state = TorrentState::new(
            source.clone(),
            torrent
                .destination
                .clone()
                .unwrap_or_else(|| self.download_root.to_string_lossy().into_owned()),
        );
        if let Some(name) = &torrent.name {
            state.name = name.clone();
        }
        state.torrent_id = Some(torrent.id.clone());

        let admitted = !torrent.paused && self.gate.try_admit(&source).await;
        if admitted {
            state.status = TorrentStatus::Downloading;
            metrics::ACTIVE_DOWNLOADS.inc();
        } else {
            state.status = TorrentStatus::Paused;
            if !torrent.paused {
                // Attached active but over the gate limit; park it.
                if let Err(e) = self.engine.pause(&torrent.id).await {
                    warn!(source = %source, error = %e, "Failed to pause restored torrent");
                }
            }
        }

        self.by_id
            .write()
            .await
            .insert(torrent.id.clone(), source.clone());
        self.catalog.write().await.insert(
            source.clone(),
            DownloadEntry {
                state,
                payload: AttachPayload::Magnet(source.clone()),
            },
        );
        self.journal.record(
            &source,
            LogStep::Added,
            LogLevel::Info,
            "Restored from saved session",
        );
        info!(source = %source, admitted, "Restored torrent from session state");
    }

    /// Drain and apply the engine's pending alerts.
    async fn drain_alerts(self: &Arc<Self>) {
        for alert in self.engine.poll_alerts().await {
            match alert {
                EngineAlert::StatusUpdate { id, stats } => {
                    let Some(source) = self.source_for(&id).await else {
                        continue;
                    };
                    let snapshot = {
                        let mut catalog = self.catalog.write().await;
                        let Some(entry) = catalog.get_mut(&source) else {
                            continue;
                        };
                        apply_stats(&mut entry.state, &stats);
                        entry.state.clone()
                    };
                    self.listeners.notify_status_update(&snapshot);
                }
                EngineAlert::MetadataResolved {
                    id,
                    name,
                    total_bytes,
                } => {
                    let Some(source) = self.source_for(&id).await else {
                        continue;
                    };
                    {
                        let mut catalog = self.catalog.write().await;
                        if let Some(entry) = catalog.get_mut(&source) {
                            entry.state.name = name.clone();
                            entry.state.file_size_bytes = total_bytes;
                        }
                    }
                    self.journal.record(
                        &source,
                        LogStep::Validating,
                        LogLevel::Info,
                        format!("Metadata resolved: {name} ({total_bytes} bytes)"),
                    );
                }
                EngineAlert::Completed { id } => {
                    let Some(source) = self.source_for(&id).await else {
                        continue;
                    };
                    self.handle_completed(&source).await;
                }
                EngineAlert::Failed { id, message } => {
                    let Some(source) = self.source_for(&id).await else {
                        continue;
                    };
                    self.mark_error(&source, &message).await;
                    self.promote_waiting().await;
                }
                EngineAlert::Message { severity, text } => {
                    debug!(severity = ?severity, "Engine message: {text}");
                    self.listeners.notify_debug(&text, severity);
                }
            }
        }
    }

    async fn source_for(&self, id: &str) -> Option<String> {
        self.by_id.read().await.get(id).cloned()
    }

    /// Exactly-once completion handling: catalog update, slot release,
    /// notification, background extraction, promotion.
    async fn handle_completed(self: &Arc<Self>, source: &str) {
        let snapshot = {
            let mut catalog = self.catalog.write().await;
            let Some(entry) = catalog.get_mut(source) else {
                return;
            };
            if entry.state.status == TorrentStatus::Completed {
                return;
            }
            entry.state.status = TorrentStatus::Completed;
            entry.state.progress_percent = 100.0;
            entry.state.download_speed_kbs = 0;
            entry.state.remaining_time_seconds = 0;
            entry.state.clone()
        };

        metrics::ACTIVE_DOWNLOADS.dec();
        metrics::DOWNLOADS_COMPLETED.inc();
        self.gate.release(&source.to_string()).await;
        self.journal.record(
            source,
            LogStep::Completed,
            LogLevel::Info,
            "Download completed",
        );
        info!(source = %source, name = %snapshot.name, "Download completed");

        // Completion is delivered exactly once, here; extraction runs
        // afterwards in the background and reports to the journal only.
        self.listeners.notify_complete(&snapshot);

        if self.settings.read().await.extract_archives {
            self.spawn_extraction(source, snapshot).await;
        }

        self.promote_waiting().await;
    }

    /// Run archive extraction on a worker task. The outcome lands in the
    /// journal; the task is cancelled if the torrent is removed.
    async fn spawn_extraction(self: &Arc<Self>, source: &str, snapshot: TorrentState) {
        let inner = Arc::clone(self);
        let source = source.to_string();
        let task_source = source.clone();

        let task = tokio::spawn(async move {
            inner
                .journal
                .record(&task_source, LogStep::Extracting, LogLevel::Info, "Extraction started");

            let destination = PathBuf::from(&snapshot.destination_path);
            let payload = destination.join(&snapshot.name);
            match inner.run_extraction(&payload, &destination).await {
                Ok((files, formats)) => {
                    if files > 0 {
                        inner.journal.record(
                            &task_source,
                            LogStep::Extracting,
                            LogLevel::Info,
                            format!("Extracted {files} files ({})", formats.join(", ")),
                        );
                    }
                }
                Err(e) => {
                    inner.journal.record(
                        &task_source,
                        LogStep::Extracting,
                        LogLevel::Warning,
                        format!("Extraction failed: {e}"),
                    );
                    warn!(source = %task_source, error = %e, "Extraction failed");
                }
            }

            inner.extraction_tasks.lock().await.remove(&task_source);
        });

        self.extraction_tasks.lock().await.insert(source, task);
    }

    /// Extract the payload if it is an archive. A single-file torrent is
    /// checked directly; a directory payload has each of its top-level
    /// files checked.
    async fn run_extraction(
        &self,
        payload: &Path,
        destination: &Path,
    ) -> Result<(u64, Vec<String>), crate::extract::ExtractionError> {
        let mut files = 0u64;
        let mut formats = Vec::new();

        let mut candidates = Vec::new();
        if payload.is_file() {
            candidates.push(payload.to_path_buf());
        } else if payload.is_dir() {
            let mut dir = tokio::fs::read_dir(payload).await?;
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    candidates.push(entry.path());
                }
            }
        }

        for candidate in candidates {
            let target_dir = if payload.is_dir() { payload } else { destination };
            match self.extractor.extract_if_archive(&candidate, target_dir).await {
                Ok(outcome) => {
                    if let Some(format) = outcome.format {
                        metrics::EXTRACTIONS_TOTAL
                            .with_label_values(&[format.as_str(), "success"])
                            .inc();
                        formats.push(format.as_str().to_string());
                        files += outcome.files_extracted;
                    }
                }
                Err(e) => {
                    if let Some(format) = ArchiveExtractor::detect_format(&candidate) {
                        metrics::EXTRACTIONS_TOTAL
                            .with_label_values(&[format.as_str(), "failed"])
                            .inc();
                    }
                    return Err(e);
                }
            }
        }

        Ok((files, formats))
    }

    /// Pause everything when free space under the download root drops below
    /// the configured floor. Paused torrents stay `Paused`, never `Error`.
    async fn check_disk_space(&self) {
        if self.min_free_disk_bytes == 0 {
            return;
        }
        let available = match fs2::available_space(&self.download_root) {
            Ok(available) => available,
            Err(e) => {
                debug!(error = %e, "Could not read free disk space");
                return;
            }
        };

        if available >= self.min_free_disk_bytes {
            if self.disk_low.swap(false, Ordering::Relaxed) {
                info!(available, "Disk space recovered, resuming queue promotion");
                self.promote_waiting().await;
            }
            return;
        }

        if !self.disk_low.swap(true, Ordering::Relaxed) {
            warn!(
                available,
                floor = self.min_free_disk_bytes,
                "Low disk space, pausing active downloads"
            );
            self.listeners.notify_disk_space_low(
                &self.download_root.to_string_lossy(),
                available,
                self.min_free_disk_bytes,
            );
        }

        let active: Vec<String> = {
            let catalog = self.catalog.read().await;
            catalog
                .iter()
                .filter(|(_, e)| e.state.status == TorrentStatus::Downloading)
                .map(|(source, _)| source.clone())
                .collect()
        };
        for source in active {
            if let Err(e) = self.pause(&source, "Paused: low disk space").await {
                warn!(source = %source, error = %e, "Failed to pause on low disk space");
            }
        }
    }
}

/// Map engine stats onto the public state. Progress never moves backwards
/// while downloading.
fn apply_stats(state: &mut TorrentState, stats: &crate::engine::TorrentStats) {
    let percent = (stats.progress * 100.0).clamp(0.0, 100.0) as f32;
    if percent > state.progress_percent {
        state.progress_percent = percent;
    }
    state.download_speed_kbs = stats.download_speed / 1024;
    state.upload_speed_kbs = stats.upload_speed / 1024;
    state.peers = stats.peers;
    state.seeds = stats.seeds;
    if stats.total_bytes > 0 {
        state.file_size_bytes = stats.total_bytes;
    }
    if let Some(name) = &stats.name {
        if !name.is_empty() {
            state.name = name.clone();
        }
    }
    state.remaining_time_seconds = match stats.eta_secs {
        Some(eta) => eta as i64,
        None if stats.finished => 0,
        None => super::types::REMAINING_TIME_UNKNOWN,
    };
}

/// Fetch a `.torrent` file over HTTP with a bounded timeout.
async fn fetch_torrent_file(url: &str) -> Result<Vec<u8>, ManagerError> {
    let client = reqwest::Client::builder()
        .timeout(TORRENT_FETCH_TIMEOUT)
        .build()
        .map_err(|e| ManagerError::TorrentFetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ManagerError::TorrentFetch(format!("{url}: {e}")))?
        .error_for_status()
        .map_err(|e| ManagerError::TorrentFetch(format!("{url}: {e}")))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ManagerError::TorrentFetch(format!("{url}: {e}")))?;

    if bytes.is_empty() {
        return Err(ManagerError::TorrentFetch(format!("{url}: empty response")));
    }
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TorrentStats;

    #[test]
    fn test_magnet_validation() {
        assert!(MAGNET_RE.is_match(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=test"
        ));
        assert!(MAGNET_RE.is_match(
            "magnet:?xt=urn:btih:ABCDEFGHIJKLMNOPQRSTUVWXYZ234567"
        ));
        assert!(!MAGNET_RE.is_match("magnet:?dn=no-hash-here"));
        assert!(!MAGNET_RE.is_match("magnet:?xt=urn:btih:tooshort"));
        assert!(!MAGNET_RE.is_match("http://example.com/file.torrent"));
    }

    #[test]
    fn test_apply_stats_progress_is_monotonic() {
        let mut state = TorrentState::new("magnet:?xt=urn:btih:x", "/dl");
        state.progress_percent = 40.0;

        let stats = TorrentStats {
            progress: 0.3,
            ..TorrentStats::default()
        };
        apply_stats(&mut state, &stats);
        assert_eq!(state.progress_percent, 40.0);

        let stats = TorrentStats {
            progress: 0.8,
            ..TorrentStats::default()
        };
        apply_stats(&mut state, &stats);
        assert_eq!(state.progress_percent, 80.0);
    }

    #[test]
    fn test_apply_stats_units() {
        let mut state = TorrentState::new("magnet:?xt=urn:btih:x", "/dl");
        let stats = TorrentStats {
            download_speed: 2048 * 1024,
            upload_speed: 512 * 1024,
            eta_secs: Some(90),
            total_bytes: 1000,
            peers: 4,
            seeds: 7,
            ..TorrentStats::default()
        };
        apply_stats(&mut state, &stats);
        assert_eq!(state.download_speed_kbs, 2048);
        assert_eq!(state.upload_speed_kbs, 512);
        assert_eq!(state.remaining_time_seconds, 90);
        assert_eq!(state.file_size_bytes, 1000);
        assert_eq!(state.peers, 4);
        assert_eq!(state.seeds, 7);
    }

    #[test]
    fn test_apply_stats_unknown_eta() {
        let mut state = TorrentState::new("magnet:?xt=urn:btih:x", "/dl");
        let stats = TorrentStats::default();
        apply_stats(&mut state, &stats);
        assert_eq!(
            state.remaining_time_seconds,
            super::super::types::REMAINING_TIME_UNKNOWN
        );

        let stats = TorrentStats {
            finished: true,
            ..TorrentStats::default()
        };
        apply_stats(&mut state, &stats);
        assert_eq!(state.remaining_time_seconds, 0);
    }
}
