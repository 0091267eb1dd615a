//! The fixed health-check battery.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::engine::{TorrentEngine, TorrentStats};

use super::{HealthCheck, TorrentHealthReport};

/// How long to wait for the engine to produce statistics before the
/// connectivity checks are declared failed.
const STATS_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the health battery against an attached torrent.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    /// Free-space floor used by the disk check.
    min_free_disk_bytes: u64,
}

impl HealthChecker {
    pub fn new(min_free_disk_bytes: u64) -> Self {
        Self {
            min_free_disk_bytes,
        }
    }

    /// Run the battery against an attached torrent.
    ///
    /// The checks, in order: metadata resolved, has peers, has seeds, piece
    /// availability, disk space. A stats fetch that times out fails the
    /// swarm-dependent checks instead of hanging the caller.
    pub async fn check(
        &self,
        engine: &dyn TorrentEngine,
        id: &str,
        destination: &Path,
    ) -> TorrentHealthReport {
        let stats = match tokio::time::timeout(STATS_TIMEOUT, engine.stats(id)).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                debug!(id = %id, error = %e, "Stats fetch failed during health check");
                None
            }
            Err(_) => {
                debug!(id = %id, "Stats fetch timed out during health check");
                None
            }
        };

        let mut checks = Vec::with_capacity(5);
        checks.push(self.check_metadata(stats.as_ref()));
        checks.push(self.check_peers(stats.as_ref()));
        checks.push(self.check_seeds(stats.as_ref()));
        checks.push(self.check_availability(stats.as_ref()));
        checks.push(self.check_disk_space(stats.as_ref(), destination));

        TorrentHealthReport::from_checks(Some(id.to_string()), checks)
    }

    fn check_metadata(&self, stats: Option<&TorrentStats>) -> HealthCheck {
        match stats {
            Some(s) if s.name.is_some() && s.total_bytes > 0 => HealthCheck::new(
                "metadata_resolved",
                true,
                format!(
                    "{} ({} bytes)",
                    s.name.as_deref().unwrap_or_default(),
                    s.total_bytes
                ),
            ),
            Some(_) => HealthCheck::new(
                "metadata_resolved",
                false,
                "metadata not yet resolved (magnet still resolving?)",
            ),
            None => HealthCheck::new("metadata_resolved", false, "no statistics available"),
        }
    }

    fn check_peers(&self, stats: Option<&TorrentStats>) -> HealthCheck {
        match stats {
            Some(s) if s.peers > 0 => {
                HealthCheck::new("has_peers", true, format!("{} peers connected", s.peers))
            }
            Some(_) => HealthCheck::new("has_peers", false, "no peers connected"),
            None => HealthCheck::new("has_peers", false, "no statistics available"),
        }
    }

    fn check_seeds(&self, stats: Option<&TorrentStats>) -> HealthCheck {
        match stats {
            Some(s) if s.seeds > 0 => {
                HealthCheck::new("has_seeds", true, format!("{} seeds connected", s.seeds))
            }
            Some(_) => HealthCheck::new("has_seeds", false, "no seeds connected"),
            None => HealthCheck::new("has_seeds", false, "no statistics available"),
        }
    }

    fn check_availability(&self, stats: Option<&TorrentStats>) -> HealthCheck {
        match stats {
            Some(s) if s.availability > 0.0 => HealthCheck::new(
                "piece_availability",
                true,
                format!("{:.2} distributed copies", s.availability),
            ),
            Some(_) => HealthCheck::new(
                "piece_availability",
                false,
                "no pieces available in the swarm",
            ),
            None => HealthCheck::new("piece_availability", false, "no statistics available"),
        }
    }

    fn check_disk_space(&self, stats: Option<&TorrentStats>, destination: &Path) -> HealthCheck {
        // Need the remaining payload plus the configured floor.
        let remaining = stats
            .map(|s| s.total_bytes.saturating_sub(s.downloaded_bytes))
            .unwrap_or(0);
        let required = remaining.saturating_add(self.min_free_disk_bytes);

        match fs2::available_space(destination) {
            Ok(available) if available >= required => HealthCheck::new(
                "disk_space",
                true,
                format!("{} bytes available, {} required", available, required),
            ),
            Ok(available) => HealthCheck::new(
                "disk_space",
                false,
                format!("{} bytes available, {} required", available, required),
            ),
            Err(e) => HealthCheck::new(
                "disk_space",
                false,
                format!("could not determine free space: {}", e),
            ),
        }
    }
}
