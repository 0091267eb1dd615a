//! Notification fan-out to registered observers.

use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::engine::AlertSeverity;

use super::types::TorrentState;

/// Observer interface for manager events.
///
/// Callbacks run synchronously on the manager's poll task and must not
/// block; anything long-running belongs on a channel the listener owns.
/// Implementations must be `Send + Sync` since they are invoked from
/// async tasks.
pub trait TorrentNotificationListener: Send + Sync {
    /// A torrent finished downloading. Fires at completion; archive
    /// extraction, if enabled, runs afterwards in the background.
    fn on_torrent_complete(&self, state: &TorrentState) {
        let _ = state;
    }

    /// A torrent entered the `Error` state.
    fn on_torrent_error(&self, state: &TorrentState, message: &str) {
        let _ = (state, message);
    }

    /// Free disk space at a destination dropped below the configured floor.
    /// `required_bytes` is the floor the space was measured against.
    fn on_disk_space_low(&self, path: &str, available_bytes: u64, required_bytes: u64) {
        let _ = (path, available_bytes, required_bytes);
    }

    /// Diagnostic message from the engine or the manager.
    fn on_debug_message(&self, message: &str, severity: AlertSeverity) {
        let _ = (message, severity);
    }

    /// A torrent's live stats were refreshed.
    fn on_torrent_status_update(&self, state: &TorrentState) {
        let _ = state;
    }
}

/// Shared, append-only set of listeners.
///
/// Registration happens rarely (startup, typically) while notification
/// happens on every poll tick, so a std `RwLock` over an `Arc` list keeps
/// the hot path to a read lock and a clone.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn TorrentNotificationListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn TorrentNotificationListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(_) => warn!("Listener set lock poisoned, dropping registration"),
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn TorrentNotificationListener>> {
        self.listeners.read().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn notify_complete(&self, state: &TorrentState) {
        for listener in self.snapshot() {
            listener.on_torrent_complete(state);
        }
    }

    pub fn notify_error(&self, state: &TorrentState, message: &str) {
        for listener in self.snapshot() {
            listener.on_torrent_error(state, message);
        }
    }

    pub fn notify_disk_space_low(&self, path: &str, available_bytes: u64, required_bytes: u64) {
        for listener in self.snapshot() {
            listener.on_disk_space_low(path, available_bytes, required_bytes);
        }
    }

    pub fn notify_debug(&self, message: &str, severity: AlertSeverity) {
        for listener in self.snapshot() {
            listener.on_debug_message(message, severity);
        }
    }

    pub fn notify_status_update(&self, state: &TorrentState) {
        for listener in self.snapshot() {
            listener.on_torrent_status_update(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingListener;

    #[test]
    fn test_fan_out_reaches_all_listeners() {
        let set = ListenerSet::new();
        let first = Arc::new(RecordingListener::new());
        let second = Arc::new(RecordingListener::new());
        set.add(first.clone());
        set.add(second.clone());
        assert_eq!(set.len(), 2);

        let state = TorrentState::new("magnet:?xt=urn:btih:abc", "/dl");
        set.notify_complete(&state);
        set.notify_debug("hello", AlertSeverity::Info);

        assert_eq!(first.completed().len(), 1);
        assert_eq!(second.completed().len(), 1);
        assert_eq!(
            first.debug_messages(),
            vec![("hello".to_string(), AlertSeverity::Info)]
        );
    }

    #[test]
    fn test_empty_set_notifies_nobody() {
        let set = ListenerSet::new();
        assert!(set.is_empty());
        let state = TorrentState::new("magnet:?xt=urn:btih:abc", "/dl");
        // Must not panic with zero listeners.
        set.notify_error(&state, "boom");
        set.notify_disk_space_low("/dl", 1024, 4096);
    }
}
