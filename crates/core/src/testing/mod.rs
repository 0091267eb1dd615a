//! Test utilities: mock engine and recording listener.

mod mock_engine;
mod recording_listener;

pub use mock_engine::{MockTorrentEngine, RecordedAttach};
pub use recording_listener::RecordingListener;
