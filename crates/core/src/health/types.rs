//! Types for torrent health reports.

use serde::{Deserialize, Serialize};

/// One named check in a health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Stable check name (e.g. "has_peers").
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable details.
    pub details: String,
}

impl HealthCheck {
    pub fn new(name: &str, passed: bool, details: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            details: details.into(),
        }
    }
}

/// Transient report produced by a health-check run. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentHealthReport {
    /// Info hash of the torrent, when known.
    pub info_hash: Option<String>,
    /// Ordered list of checks, in execution order.
    pub checks: Vec<HealthCheck>,
    /// True iff every check passed.
    pub healthy: bool,
}

impl TorrentHealthReport {
    /// Build a report from its checks, deriving the `healthy` flag.
    pub fn from_checks(info_hash: Option<String>, checks: Vec<HealthCheck>) -> Self {
        let healthy = checks.iter().all(|c| c.passed);
        Self {
            info_hash,
            checks,
            healthy,
        }
    }

    /// Look up a check by name.
    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_iff_all_pass() {
        let report = TorrentHealthReport::from_checks(
            Some("abc".to_string()),
            vec![
                HealthCheck::new("a", true, "ok"),
                HealthCheck::new("b", true, "ok"),
            ],
        );
        assert!(report.healthy);

        let report = TorrentHealthReport::from_checks(
            None,
            vec![
                HealthCheck::new("a", true, "ok"),
                HealthCheck::new("b", false, "nope"),
            ],
        );
        assert!(!report.healthy);
    }

    #[test]
    fn test_check_lookup() {
        let report = TorrentHealthReport::from_checks(
            None,
            vec![HealthCheck::new("has_peers", true, "5 peers")],
        );
        assert!(report.check("has_peers").unwrap().passed);
        assert!(report.check("missing").is_none());
    }
}
