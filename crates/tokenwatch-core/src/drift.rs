//! Vendor vs. inference token-count reconciliation
//!
//! Each device keeps the latest count seen from each origin. The two slots are
//! overwritten independently and compared point-in-time; nothing accumulates.

use crate::sample::Origin;
use serde::{Deserialize, Serialize};

/// Drift magnitude, in percent, above which an event is raised
pub const DRIFT_ALERT_THRESHOLD_PCT: f64 = 2.0;

/// Comparison of the latest vendor and inference counts for one device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftReading {
    pub vendor_count: u64,
    pub inference_count: u64,
    /// Signed: positive when the vendor counted more
    pub drift_pct: f64,
}

impl DriftReading {
    /// Compare two counts; `None` unless both are non-zero
    pub fn compute(vendor_count: u64, inference_count: u64) -> Option<Self> {
        if vendor_count == 0 || inference_count == 0 {
            return None;
        }
        let diff = vendor_count as f64 - inference_count as f64;
        let total = vendor_count as f64 + inference_count as f64;
        Some(Self {
            vendor_count,
            inference_count,
            drift_pct: (diff / total) * 100.0,
        })
    }

    /// Whether the drift magnitude strictly exceeds the alert threshold
    pub fn exceeds_threshold(&self) -> bool {
        self.drift_pct.abs() > DRIFT_ALERT_THRESHOLD_PCT
    }

    /// Agreement between the two sources, 100 meaning identical counts
    pub fn accuracy_pct(&self) -> f64 {
        100.0 - self.drift_pct.abs()
    }
}

/// Last-known counts per origin for one device
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriftReconciler {
    last_vendor_count: u64,
    last_inference_count: u64,
}

impl DriftReconciler {
    /// Create a reconciler with both slots empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a count for its origin and compare the two slots.
    ///
    /// Unspecified origins only trigger the comparison. Returns `None` while either
    /// slot is empty or zero.
    pub fn reconcile(&mut self, origin: Origin, tokens_processed: u64) -> Option<DriftReading> {
        match origin {
            Origin::Vendor => self.last_vendor_count = tokens_processed,
            Origin::Inference => self.last_inference_count = tokens_processed,
            Origin::Unspecified => {}
        }
        DriftReading::compute(self.last_vendor_count, self.last_inference_count)
    }

    /// Latest vendor-origin count, 0 if none seen
    pub fn last_vendor_count(&self) -> u64 {
        self.last_vendor_count
    }

    /// Latest inference-origin count, 0 if none seen
    pub fn last_inference_count(&self) -> u64 {
        self.last_inference_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_counterpart_skips() {
        let mut reconciler = DriftReconciler::new();
        assert!(reconciler.reconcile(Origin::Vendor, 1000).is_none());
        assert!(reconciler.reconcile(Origin::Unspecified, 5).is_none());
        assert_eq!(reconciler.last_vendor_count(), 1000);
        assert_eq!(reconciler.last_inference_count(), 0);
    }

    #[test]
    fn test_boundary_is_not_an_alert() {
        let reading = DriftReading::compute(1020, 980).unwrap();
        assert_eq!(reading.drift_pct, 2.0);
        assert!(!reading.exceeds_threshold());
        assert_eq!(reading.accuracy_pct(), 98.0);
    }

    #[test]
    fn test_just_above_boundary_alerts() {
        // 100 * 2010 / 100000 = 2.01
        let reading = DriftReading::compute(51_005, 48_995).unwrap();
        assert!((reading.drift_pct - 2.01).abs() < 1e-9);
        assert!(reading.exceeds_threshold());
    }

    #[test]
    fn test_drift_is_symmetric() {
        for (a, b) in [(1020, 980), (51_005, 48_995), (10, 90), (7, 7)] {
            let forward = DriftReading::compute(a, b).unwrap();
            let reverse = DriftReading::compute(b, a).unwrap();
            assert_eq!(forward.drift_pct, -reverse.drift_pct);
            assert_eq!(forward.exceeds_threshold(), reverse.exceeds_threshold());
            assert_eq!(forward.accuracy_pct(), reverse.accuracy_pct());
        }
    }

    #[test]
    fn test_slots_overwrite_rather_than_accumulate() {
        let mut reconciler = DriftReconciler::new();
        reconciler.reconcile(Origin::Vendor, 500);
        reconciler.reconcile(Origin::Vendor, 1020);
        let reading = reconciler.reconcile(Origin::Inference, 980).unwrap();

        assert_eq!(reading.vendor_count, 1020);
        assert_eq!(reading.inference_count, 980);
        assert_eq!(reading.drift_pct, 2.0);
    }

    #[test]
    fn test_zero_count_clears_slot() {
        let mut reconciler = DriftReconciler::new();
        reconciler.reconcile(Origin::Vendor, 100);
        assert!(reconciler.reconcile(Origin::Inference, 100).is_some());
        assert!(reconciler.reconcile(Origin::Inference, 0).is_none());
    }
}
