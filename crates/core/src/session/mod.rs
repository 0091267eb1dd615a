//! Session-state persistence.
//!
//! Wraps the engine's opaque resume blob in a small versioned envelope so
//! the application can persist it across restarts (Base64-encoded inside
//! its JSON config) and the manager can detect incompatible blobs instead
//! of handing garbage to the engine.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{EngineError, RestoredTorrent, TorrentEngine};

/// Envelope format version. Bump when the layout changes.
const ENVELOPE_VERSION: u32 = 1;

/// Errors that can occur while saving or restoring session state.
#[derive(Debug, Error)]
pub enum SessionStateError {
    #[error("session blob is corrupt: {0}")]
    Corrupt(String),

    #[error("session blob version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Versioned wrapper around the engine's opaque state payload.
#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    version: u32,
    engine: String,
    payload: String,
}

/// Produces and consumes session-state blobs for one engine.
pub struct SessionStateStore {
    engine: Arc<dyn TorrentEngine>,
}

impl SessionStateStore {
    pub fn new(engine: Arc<dyn TorrentEngine>) -> Self {
        Self { engine }
    }

    /// Snapshot the engine's resumable state. Safe to call while torrents
    /// are active.
    pub async fn snapshot(&self) -> Result<Vec<u8>, SessionStateError> {
        let payload = self.engine.save_state().await?;

        let envelope = SessionEnvelope {
            version: ENVELOPE_VERSION,
            engine: self.engine.name().to_string(),
            payload: BASE64.encode(&payload),
        };

        let blob = serde_json::to_vec(&envelope)
            .map_err(|e| SessionStateError::Corrupt(e.to_string()))?;

        debug!(bytes = blob.len(), "Session state snapshot taken");

        Ok(blob)
    }

    /// Re-attach torrents from a blob produced by `snapshot`.
    ///
    /// An empty blob is a fresh session (no torrents restored). A corrupt
    /// or incompatible blob is a typed error; callers are expected to log
    /// it and continue with a fresh session instead of failing startup.
    pub async fn restore(&self, blob: &[u8]) -> Result<Vec<RestoredTorrent>, SessionStateError> {
        if blob.is_empty() {
            debug!("Empty session blob, starting fresh");
            return Ok(Vec::new());
        }

        let envelope: SessionEnvelope = serde_json::from_slice(blob)
            .map_err(|e| SessionStateError::Corrupt(e.to_string()))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(SessionStateError::UnsupportedVersion {
                found: envelope.version,
                expected: ENVELOPE_VERSION,
            });
        }

        if envelope.engine != self.engine.name() {
            warn!(
                saved_engine = %envelope.engine,
                current_engine = %self.engine.name(),
                "Session blob was produced by a different engine backend"
            );
        }

        let payload = BASE64
            .decode(envelope.payload.as_bytes())
            .map_err(|e| SessionStateError::Corrupt(e.to_string()))?;

        Ok(self.engine.load_state(&payload).await?)
    }

    /// Encode a blob for embedding as a string field in a JSON config file.
    pub fn encode_for_config(blob: &[u8]) -> String {
        BASE64.encode(blob)
    }

    /// Decode a blob previously encoded with `encode_for_config`.
    pub fn decode_from_config(encoded: &str) -> Result<Vec<u8>, SessionStateError> {
        BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| SessionStateError::Corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AttachRequest;
    use crate::testing::MockTorrentEngine;

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let engine = Arc::new(MockTorrentEngine::new());
        for i in 0..3 {
            engine
                .attach(
                    AttachRequest::magnet(format!("magnet:?xt=urn:btih:{:040x}", i))
                        .with_destination("/dl"),
                )
                .await
                .unwrap();
        }

        let store = SessionStateStore::new(engine.clone());
        let blob = store.snapshot().await.unwrap();

        // Fresh engine, same blob.
        let engine2 = Arc::new(MockTorrentEngine::new());
        let store2 = SessionStateStore::new(engine2.clone());
        let restored = store2.restore(&blob).await.unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(engine2.attached_count().await, 3);
    }

    #[tokio::test]
    async fn test_empty_blob_is_fresh_session() {
        let engine = Arc::new(MockTorrentEngine::new());
        let store = SessionStateStore::new(engine);
        let restored = store.restore(&[]).await.unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_typed_error() {
        let engine = Arc::new(MockTorrentEngine::new());
        let store = SessionStateStore::new(engine);
        let result = store.restore(b"garbage bytes").await;
        assert!(matches!(result, Err(SessionStateError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let engine = Arc::new(MockTorrentEngine::new());
        let store = SessionStateStore::new(engine);

        let envelope = SessionEnvelope {
            version: 99,
            engine: "mock".to_string(),
            payload: BASE64.encode(b"[]"),
        };
        let blob = serde_json::to_vec(&envelope).unwrap();

        let result = store.restore(&blob).await;
        assert!(matches!(
            result,
            Err(SessionStateError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_config_encoding_round_trip() {
        let blob = b"\x00\x01binary blob\xff";
        let encoded = SessionStateStore::encode_for_config(blob);
        let decoded = SessionStateStore::decode_from_config(&encoded).unwrap();
        assert_eq!(decoded, blob);
    }

    #[test]
    fn test_config_decoding_rejects_garbage() {
        assert!(SessionStateStore::decode_from_config("not base64 !!!").is_err());
    }
}
