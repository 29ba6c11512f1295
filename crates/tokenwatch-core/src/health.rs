//! Device health scoring
//!
//! Two independent checks, thermal headroom and throughput efficiency, each
//! able to pull the device down from healthy. The worse result wins.

use crate::sku::SkuProfile;
use serde::{Deserialize, Serialize};

/// Fraction of the SKU max temperature above which a device is in warning
const THERMAL_WARNING_RATIO: f64 = 0.9;

/// Efficiency (current / smoothed) below which a device is critical
const EFFICIENCY_CRITICAL: f64 = 0.8;

/// Efficiency below which a device is in warning
const EFFICIENCY_WARNING: f64 = 0.9;

/// Tri-state health, ordered from worst to best
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Critical = 0,
    Warning = 1,
    #[default]
    Healthy = 2,
}

impl HealthStatus {
    /// Numeric score exposed to scrapers (0=critical, 1=warning, 2=healthy)
    pub fn score(&self) -> f64 {
        *self as u8 as f64
    }

    /// Combine with another check result; the result is never better than either
    pub fn lower_to(self, other: HealthStatus) -> HealthStatus {
        self.min(other)
    }
}

/// Individual health check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Check name
    pub name: String,

    /// Check status
    pub status: HealthStatus,

    /// Observed value
    pub value: f64,

    /// Threshold the value was compared against
    pub threshold: f64,
}

/// Readings the scorer needs, taken after the current sample was applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    pub temperature_c: Option<f64>,
    pub current_tps: f64,
    pub smoothed_tps: Option<f64>,
}

/// Overall health and the checks that produced it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
}

impl HealthAssessment {
    /// Score the device against its SKU profile
    pub fn assess(inputs: &HealthInputs, profile: &SkuProfile) -> Self {
        let mut status = HealthStatus::Healthy;
        let mut checks = Vec::with_capacity(2);

        if let Some(temperature) = inputs.temperature_c {
            let check = thermal_check(temperature, profile.max_temperature);
            status = status.lower_to(check.status);
            checks.push(check);
        }

        if let Some(smoothed) = inputs.smoothed_tps.filter(|avg| *avg > 0.0) {
            let check = efficiency_check(inputs.current_tps / smoothed);
            status = status.lower_to(check.status);
            checks.push(check);
        }

        Self { status, checks }
    }

    /// Whether every check passed
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Names of the checks that did not pass
    pub fn failing_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.status != HealthStatus::Healthy)
            .map(|c| c.name.as_str())
            .collect()
    }
}

fn thermal_check(temperature: f64, max_temperature: f64) -> HealthCheck {
    let (status, threshold) = if temperature > max_temperature {
        (HealthStatus::Critical, max_temperature)
    } else if temperature > max_temperature * THERMAL_WARNING_RATIO {
        (HealthStatus::Warning, max_temperature * THERMAL_WARNING_RATIO)
    } else {
        (HealthStatus::Healthy, max_temperature * THERMAL_WARNING_RATIO)
    };
    HealthCheck {
        name: "temperature".to_string(),
        status,
        value: temperature,
        threshold,
    }
}

fn efficiency_check(efficiency: f64) -> HealthCheck {
    let (status, threshold) = if efficiency < EFFICIENCY_CRITICAL {
        (HealthStatus::Critical, EFFICIENCY_CRITICAL)
    } else if efficiency < EFFICIENCY_WARNING {
        (HealthStatus::Warning, EFFICIENCY_WARNING)
    } else {
        (HealthStatus::Healthy, EFFICIENCY_WARNING)
    };
    HealthCheck {
        name: "throughput_efficiency".to_string(),
        status,
        value: efficiency,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a100() -> SkuProfile {
        SkuProfile::new("A100", 2.5, 400.0, 83.0, 81920.0)
    }

    fn inputs(temperature: Option<f64>, current: f64, smoothed: Option<f64>) -> HealthInputs {
        HealthInputs {
            temperature_c: temperature,
            current_tps: current,
            smoothed_tps: smoothed,
        }
    }

    #[test]
    fn test_health_status_ordering() {
        assert!(HealthStatus::Critical < HealthStatus::Warning);
        assert!(HealthStatus::Warning < HealthStatus::Healthy);
        assert_eq!(HealthStatus::Critical.score(), 0.0);
        assert_eq!(HealthStatus::Warning.score(), 1.0);
        assert_eq!(HealthStatus::Healthy.score(), 2.0);
    }

    #[test]
    fn test_no_readings_is_healthy() {
        let assessment = HealthAssessment::assess(&HealthInputs::default(), &a100());
        assert!(assessment.is_healthy());
        assert!(assessment.checks.is_empty());
    }

    #[test]
    fn test_thermal_thresholds() {
        let profile = a100();
        let at = |t| HealthAssessment::assess(&inputs(Some(t), 0.0, None), &profile).status;

        assert_eq!(at(70.0), HealthStatus::Healthy);
        assert_eq!(at(74.7), HealthStatus::Healthy); // exactly 0.9 * 83
        assert_eq!(at(75.0), HealthStatus::Warning);
        assert_eq!(at(83.0), HealthStatus::Warning);
        assert_eq!(at(83.5), HealthStatus::Critical);
    }

    #[test]
    fn test_health_non_increasing_with_temperature() {
        let profile = a100();
        let mut previous = HealthStatus::Healthy;
        let mut temperature = 40.0;
        while temperature < 100.0 {
            let status =
                HealthAssessment::assess(&inputs(Some(temperature), 100.0, Some(100.0)), &profile)
                    .status;
            assert!(status <= previous, "health rose at {temperature}°C");
            previous = status;
            temperature += 0.5;
        }
        assert_eq!(previous, HealthStatus::Critical);
    }

    #[test]
    fn test_efficiency_thresholds() {
        let profile = a100();
        let at = |current| {
            HealthAssessment::assess(&inputs(None, current, Some(100.0)), &profile).status
        };

        assert_eq!(at(100.0), HealthStatus::Healthy);
        assert_eq!(at(90.0), HealthStatus::Healthy);
        assert_eq!(at(85.0), HealthStatus::Warning);
        assert_eq!(at(79.0), HealthStatus::Critical);
    }

    #[test]
    fn test_efficiency_skipped_without_average() {
        let profile = a100();
        let assessment = HealthAssessment::assess(&inputs(None, 0.0, Some(0.0)), &profile);
        assert!(assessment.is_healthy());
        let assessment = HealthAssessment::assess(&inputs(None, 0.0, None), &profile);
        assert!(assessment.is_healthy());
    }

    #[test]
    fn test_later_check_only_lowers_score() {
        let profile = a100();

        // thermal critical, efficiency fine
        let assessment =
            HealthAssessment::assess(&inputs(Some(90.0), 100.0, Some(100.0)), &profile);
        assert_eq!(assessment.status, HealthStatus::Critical);

        // thermal warning, efficiency critical
        let assessment = HealthAssessment::assess(&inputs(Some(80.0), 50.0, Some(100.0)), &profile);
        assert_eq!(assessment.status, HealthStatus::Critical);

        // thermal critical, efficiency warning
        let assessment = HealthAssessment::assess(&inputs(Some(90.0), 85.0, Some(100.0)), &profile);
        assert_eq!(assessment.status, HealthStatus::Critical);
        assert_eq!(assessment.failing_checks(), vec!["temperature", "throughput_efficiency"]);
    }
}
