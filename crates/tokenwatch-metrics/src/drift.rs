//! Process-wide reconciliation metrics

use crate::Result;
use prometheus::{Counter, Gauge, Opts, Registry};
use tokenwatch_core::DriftReading;

/// Drift event counter and the latest reconciliation accuracy, across all devices
#[derive(Debug, Clone)]
pub struct DriftMetrics {
    /// Number of comparisons whose drift exceeded the alert threshold
    pub drift_total: Counter,

    /// Accuracy of the most recent comparison, any device
    pub reconcile_accuracy: Gauge,
}

impl DriftMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            drift_total: Counter::with_opts(Opts::new(
                "gpu_token_drift_total",
                "Total token count drift events detected",
            ))?,
            reconcile_accuracy: Gauge::with_opts(Opts::new(
                "gpu_token_reconcile_accuracy",
                "Token count reconciliation accuracy percentage",
            ))?,
        })
    }

    /// Register all collectors with the given registry
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.drift_total.clone()))?;
        registry.register(Box::new(self.reconcile_accuracy.clone()))?;
        Ok(())
    }

    /// Record one comparison; returns whether it counted as a drift event
    pub fn record(&self, reading: &DriftReading) -> bool {
        let alert = reading.exceeds_threshold();
        if alert {
            self.drift_total.inc();
        }
        self.reconcile_accuracy.set(reading.accuracy_pct());
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_boundary_and_alert() {
        let metrics = DriftMetrics::new().unwrap();

        assert!(!metrics.record(&DriftReading::compute(1020, 980).unwrap()));
        assert_eq!(metrics.drift_total.get(), 0.0);
        assert_eq!(metrics.reconcile_accuracy.get(), 98.0);

        assert!(metrics.record(&DriftReading::compute(900, 1100).unwrap()));
        assert_eq!(metrics.drift_total.get(), 1.0);
        assert_eq!(metrics.reconcile_accuracy.get(), 90.0);
    }

    #[test]
    fn test_register() {
        let registry = Registry::new();
        DriftMetrics::new().unwrap().register(&registry).unwrap();
        assert_eq!(registry.gather().len(), 2);
        assert!(DriftMetrics::new().unwrap().register(&registry).is_err());
    }
}
