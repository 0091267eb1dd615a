//! Torrent download orchestration: catalog, concurrency gate, listeners.

mod gate;
mod listener;
#[allow(clippy::module_inception)]
mod manager;
mod types;

pub use gate::ConcurrencyGate;
pub use listener::{ListenerSet, TorrentNotificationListener};
pub use manager::TorrentDownloadManager;
pub use types::{
    ManagerError, ManagerSettings, TorrentState, TorrentStatus, REMAINING_TIME_UNKNOWN,
};
