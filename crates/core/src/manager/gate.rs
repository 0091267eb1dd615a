//! Concurrency gate bounding simultaneous active downloads.

use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::engine::TorrentId;

/// Tracks the set of torrents currently holding an active-download slot.
///
/// The gate only answers admit/release; the FIFO ordering of waiting
/// torrents is the manager's catalog concern. A limit of 0 means
/// unlimited. Lowering the limit below the current active count never
/// evicts running downloads; the gate simply refuses new admissions
/// until enough slots free up naturally.
pub struct ConcurrencyGate {
    inner: Mutex<GateInner>,
}

struct GateInner {
    limit: usize,
    admitted: HashSet<TorrentId>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                limit,
                admitted: HashSet::new(),
            }),
        }
    }

    /// Try to take a slot for the given torrent. Returns `false` when the
    /// gate is full. Admitting an already-admitted torrent is a no-op
    /// that reports success.
    pub async fn try_admit(&self, id: &TorrentId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.admitted.contains(id) {
            return true;
        }
        if inner.limit != 0 && inner.admitted.len() >= inner.limit {
            return false;
        }
        inner.admitted.insert(id.clone());
        true
    }

    /// Release the slot held by the given torrent. Releasing a torrent
    /// that holds no slot is a no-op.
    pub async fn release(&self, id: &TorrentId) {
        let mut inner = self.inner.lock().await;
        inner.admitted.remove(id);
    }

    /// Change the slot limit. Takes effect for future admissions only.
    pub async fn set_limit(&self, limit: usize) {
        let mut inner = self.inner.lock().await;
        inner.limit = limit;
    }

    /// Number of torrents currently holding a slot.
    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.admitted.len()
    }

    /// Number of free slots, or `None` when unlimited.
    pub async fn available(&self) -> Option<usize> {
        let inner = self.inner.lock().await;
        if inner.limit == 0 {
            None
        } else {
            Some(inner.limit.saturating_sub(inner.admitted.len()))
        }
    }
}
