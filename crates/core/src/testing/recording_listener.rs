//! Listener that records every notification for test assertions.

use std::sync::Mutex;

use crate::engine::AlertSeverity;
use crate::manager::{TorrentNotificationListener, TorrentState};

/// Records every callback invocation.
///
/// Callbacks are synchronous, so plain mutexes are enough; tests read the
/// recorded vectors after driving the manager.
#[derive(Default)]
pub struct RecordingListener {
    completed: Mutex<Vec<TorrentState>>,
    errors: Mutex<Vec<(TorrentState, String)>>,
    disk_space_low: Mutex<Vec<(String, u64, u64)>>,
    debug: Mutex<Vec<(String, AlertSeverity)>>,
    status_updates: Mutex<Vec<TorrentState>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> Vec<TorrentState> {
        self.completed.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(TorrentState, String)> {
        self.errors.lock().unwrap().clone()
    }

    /// Recorded `(path, available_bytes, required_bytes)` triples.
    pub fn disk_space_events(&self) -> Vec<(String, u64, u64)> {
        self.disk_space_low.lock().unwrap().clone()
    }

    pub fn debug_messages(&self) -> Vec<(String, AlertSeverity)> {
        self.debug.lock().unwrap().clone()
    }

    pub fn status_updates(&self) -> Vec<TorrentState> {
        self.status_updates.lock().unwrap().clone()
    }
}

impl TorrentNotificationListener for RecordingListener {
    fn on_torrent_complete(&self, state: &TorrentState) {
        self.completed.lock().unwrap().push(state.clone());
    }

    fn on_torrent_error(&self, state: &TorrentState, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((state.clone(), message.to_string()));
    }

    fn on_disk_space_low(&self, path: &str, available_bytes: u64, required_bytes: u64) {
        self.disk_space_low
            .lock()
            .unwrap()
            .push((path.to_string(), available_bytes, required_bytes));
    }

    fn on_debug_message(&self, message: &str, severity: AlertSeverity) {
        self.debug
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }

    fn on_torrent_status_update(&self, state: &TorrentState) {
        self.status_updates.lock().unwrap().push(state.clone());
    }
}
