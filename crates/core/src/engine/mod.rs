//! Torrent engine abstraction.
//!
//! The `TorrentEngine` trait is the seam between the download manager and
//! whatever speaks the BitTorrent wire protocol. The embedded `librqbit`
//! backend is the production implementation; tests inject
//! `testing::MockTorrentEngine`.

mod librqbit;
mod types;

pub use librqbit::LibrqbitEngine;
pub use types::*;
