//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Downloads (started, completed, failed, currently active)
//! - Archive extraction
//! - Session-state restores

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

/// Downloads started total.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("seedvault_downloads_started_total", "Total downloads started").unwrap()
});

/// Downloads completed total.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seedvault_downloads_completed_total",
        "Total downloads completed successfully",
    )
    .unwrap()
});

/// Downloads failed total.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seedvault_downloads_failed_total",
        "Total downloads that failed",
    )
    .unwrap()
});

/// Downloads currently holding an active slot.
pub static ACTIVE_DOWNLOADS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seedvault_active_downloads",
        "Downloads currently active in the engine",
    )
    .unwrap()
});

/// Archive extractions by format and result.
pub static EXTRACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seedvault_extractions_total", "Total archive extractions"),
        &["format", "result"], // result: "success", "failed"
    )
    .unwrap()
});

/// Session-state restore attempts by result.
pub static SESSION_RESTORES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seedvault_session_restores_total",
            "Total session state restore attempts",
        ),
        &["result"], // "restored", "fresh", "corrupt"
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(ACTIVE_DOWNLOADS.clone()),
        Box::new(EXTRACTIONS_TOTAL.clone()),
        Box::new(SESSION_RESTORES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        // Plain counters and gauges report even at zero.
        assert!(registry.gather().len() >= 4);
    }
}
