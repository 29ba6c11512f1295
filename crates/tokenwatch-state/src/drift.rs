//! Process-wide drift statistics

use crate::Result;
use parking_lot::Mutex;
use prometheus::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use tokenwatch_core::DriftReading;
use tokenwatch_metrics::DriftMetrics;
use tracing::warn;

/// Drift event count and latest accuracy across all devices.
///
/// Accuracy is last-writer-wins: any device's comparison replaces the previous
/// value, regardless of which device produced it.
#[derive(Debug)]
pub struct DriftState {
    metrics: DriftMetrics,
    events: AtomicU64,
    comparisons: AtomicU64,
    last_accuracy: Mutex<Option<f64>>,
}

impl DriftState {
    /// Create the drift state and register its collectors
    pub fn new(registry: &Registry) -> Result<Self> {
        let metrics = DriftMetrics::new()?;
        metrics.register(registry)?;
        Ok(Self {
            metrics,
            events: AtomicU64::new(0),
            comparisons: AtomicU64::new(0),
            last_accuracy: Mutex::new(None),
        })
    }

    /// Record a comparison for `gpu_uuid`; returns whether it was a drift event
    pub fn observe(&self, gpu_uuid: &str, reading: &DriftReading) -> bool {
        let mut last_accuracy = self.last_accuracy.lock();
        let alert = self.metrics.record(reading);
        *last_accuracy = Some(reading.accuracy_pct());
        self.comparisons.fetch_add(1, Ordering::Relaxed);

        if alert {
            self.events.fetch_add(1, Ordering::Relaxed);
            warn!(
                gpu_uuid = %gpu_uuid,
                drift_percent = reading.drift_pct,
                vendor_count = reading.vendor_count,
                inference_count = reading.inference_count,
                "Token count drift detected"
            );
        }
        alert
    }

    /// Number of drift events since startup
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Number of comparisons since startup, alerting or not
    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Accuracy of the most recent comparison, `None` before the first one
    pub fn last_accuracy(&self) -> Option<f64> {
        *self.last_accuracy.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_only_above_threshold() {
        let registry = Registry::new();
        let drift = DriftState::new(&registry).unwrap();
        assert!(drift.last_accuracy().is_none());

        assert!(!drift.observe("GPU-1", &DriftReading::compute(1020, 980).unwrap()));
        assert_eq!(drift.events(), 0);
        assert_eq!(drift.last_accuracy(), Some(98.0));

        assert!(drift.observe("GPU-1", &DriftReading::compute(51_005, 48_995).unwrap()));
        assert_eq!(drift.events(), 1);
        assert_eq!(drift.comparisons(), 2);
    }

    #[test]
    fn test_accuracy_is_last_writer_wins() {
        let registry = Registry::new();
        let drift = DriftState::new(&registry).unwrap();

        drift.observe("GPU-1", &DriftReading::compute(900, 1100).unwrap());
        drift.observe("GPU-2", &DriftReading::compute(1000, 1000).unwrap());
        assert_eq!(drift.last_accuracy(), Some(100.0));
        assert_eq!(drift.events(), 1);
    }

    #[test]
    fn test_registers_once_per_registry() {
        let registry = Registry::new();
        DriftState::new(&registry).unwrap();
        assert!(DriftState::new(&registry).is_err());
    }
}
