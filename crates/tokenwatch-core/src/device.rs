//! Per-device telemetry state
//!
//! `DeviceState::apply` is the single mutation entry point. Callers serialize
//! calls per device; the state itself holds no locks.

use crate::calc::DerivedCosts;
use crate::drift::{DriftReading, DriftReconciler};
use crate::health::{HealthAssessment, HealthInputs, HealthStatus};
use crate::sample::Sample;
use crate::sku::{SkuProfile, SkuResolution};
use crate::window::ThroughputWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Last known hardware readings. `None` means never reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareState {
    pub power_draw_w: Option<f64>,
    pub temperature_c: Option<f64>,
    pub memory_usage_mb: Option<f64>,
    pub gpu_utilization_pct: Option<f64>,
}

impl HardwareState {
    /// Take every positive reading from the sample; zero or absent keeps the old value
    pub fn merge(&mut self, sample: &Sample) {
        merge_positive(&mut self.power_draw_w, sample.power_draw_w);
        merge_positive(&mut self.temperature_c, sample.temperature_c);
        merge_positive(&mut self.memory_usage_mb, sample.memory_usage_mb);
        merge_positive(&mut self.gpu_utilization_pct, sample.gpu_utilization_pct);
    }
}

fn merge_positive(slot: &mut Option<f64>, reading: Option<f64>) {
    if let Some(value) = reading.filter(|v| *v > 0.0) {
        *slot = Some(value);
    }
}

/// What one `apply` call changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplyOutcome {
    /// Instantaneous throughput, `None` if the sample carried no usable window
    pub throughput: Option<f64>,
    /// Smoothed throughput after the update
    pub smoothed: Option<f64>,
    /// Whether cost and energy were recomputed
    pub costs_updated: bool,
    /// Health after the update
    pub health: HealthStatus,
    /// Drift comparison, when both origins have reported
    pub drift: Option<DriftReading>,
}

/// Mutable state for one physical device
#[derive(Debug, Clone)]
pub struct DeviceState {
    gpu_uuid: String,
    sku: String,
    profile: SkuProfile,
    sku_fallback: bool,
    model_id: Option<String>,
    tokens_total: u64,
    tokens_prompt: u64,
    tokens_generated: u64,
    current_tps: f64,
    window: ThroughputWindow,
    hardware: HardwareState,
    costs: DerivedCosts,
    health: HealthAssessment,
    drift: DriftReconciler,
    last_drift: Option<DriftReading>,
    samples_applied: u64,
    last_capture_timestamp: Option<i64>,
    last_update: DateTime<Utc>,
}

impl DeviceState {
    /// Create state for a newly seen device, bound to the resolved SKU profile.
    ///
    /// `sku` is the SKU the device was first reported under; on a fallback the
    /// device keeps that name but computes with the default profile.
    pub fn new(
        gpu_uuid: impl Into<String>,
        sku: impl Into<String>,
        resolution: SkuResolution<'_>,
    ) -> Self {
        Self {
            gpu_uuid: gpu_uuid.into(),
            sku: sku.into(),
            profile: resolution.profile().clone(),
            sku_fallback: resolution.is_fallback(),
            model_id: None,
            tokens_total: 0,
            tokens_prompt: 0,
            tokens_generated: 0,
            current_tps: 0.0,
            window: ThroughputWindow::new(),
            hardware: HardwareState::default(),
            costs: DerivedCosts::default(),
            health: HealthAssessment::default(),
            drift: DriftReconciler::new(),
            last_drift: None,
            samples_applied: 0,
            last_capture_timestamp: None,
            last_update: Utc::now(),
        }
    }

    /// Apply one sample observed at `observed_at`.
    ///
    /// Order: counters, throughput window, model and hardware, cost/energy,
    /// health, drift. A sample without a positive window still counts tokens and
    /// updates hardware and drift but leaves throughput and cost untouched.
    pub fn apply(&mut self, sample: &Sample, observed_at: Instant) -> ApplyOutcome {
        self.tokens_total = self.tokens_total.saturating_add(sample.tokens_processed);
        if let Some(prompt) = sample.tokens_prompt {
            self.tokens_prompt = self.tokens_prompt.saturating_add(prompt);
        }
        if let Some(generated) = sample.tokens_generated {
            self.tokens_generated = self.tokens_generated.saturating_add(generated);
        }

        let throughput = sample.throughput();
        if let Some(tps) = throughput {
            self.current_tps = tps;
            self.window.update(tps, sample.origin, observed_at);
        }

        if let Some(model_id) = sample.model_id.as_ref().filter(|m| !m.is_empty()) {
            self.model_id = Some(model_id.clone());
        }
        self.hardware.merge(sample);

        let costs_updated = match throughput {
            Some(tps) => self.costs.update(tps, &self.profile),
            None => false,
        };

        self.health = HealthAssessment::assess(
            &HealthInputs {
                temperature_c: self.hardware.temperature_c,
                current_tps: self.current_tps,
                smoothed_tps: self.window.smoothed(),
            },
            &self.profile,
        );

        let drift = self.drift.reconcile(sample.origin, sample.tokens_processed);
        if drift.is_some() {
            self.last_drift = drift;
        }

        self.samples_applied += 1;
        if sample.timestamp.is_some() {
            self.last_capture_timestamp = sample.timestamp;
        }
        self.last_update = Utc::now();

        ApplyOutcome {
            throughput,
            smoothed: self.window.smoothed(),
            costs_updated,
            health: self.health.status,
            drift,
        }
    }

    pub fn gpu_uuid(&self) -> &str {
        &self.gpu_uuid
    }

    /// SKU the device was registered under
    pub fn sku(&self) -> &str {
        &self.sku
    }

    /// Profile used for cost, energy and thermal limits
    pub fn profile(&self) -> &SkuProfile {
        &self.profile
    }

    /// Whether the profile is the default stand-in for an unknown SKU
    pub fn is_sku_fallback(&self) -> bool {
        self.sku_fallback
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn tokens_total(&self) -> u64 {
        self.tokens_total
    }

    pub fn tokens_prompt(&self) -> u64 {
        self.tokens_prompt
    }

    pub fn tokens_generated(&self) -> u64 {
        self.tokens_generated
    }

    /// Instantaneous throughput of the latest sample with a usable window
    pub fn current_tps(&self) -> f64 {
        self.current_tps
    }

    /// Mean throughput over the trailing window
    pub fn smoothed_tps(&self) -> Option<f64> {
        self.window.smoothed()
    }

    pub fn window(&self) -> &ThroughputWindow {
        &self.window
    }

    pub fn hardware(&self) -> &HardwareState {
        &self.hardware
    }

    pub fn costs(&self) -> &DerivedCosts {
        &self.costs
    }

    pub fn health(&self) -> &HealthAssessment {
        &self.health
    }

    pub fn drift(&self) -> &DriftReconciler {
        &self.drift
    }

    /// Most recent vendor/inference comparison for this device
    pub fn last_drift(&self) -> Option<&DriftReading> {
        self.last_drift.as_ref()
    }

    pub fn samples_applied(&self) -> u64 {
        self.samples_applied
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Serializable copy of the current readings
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            gpu_uuid: self.gpu_uuid.clone(),
            gpu_sku: self.sku.clone(),
            sku_fallback: self.sku_fallback,
            model_id: self.model_id.clone(),
            tokens_total: self.tokens_total,
            current_tps: self.current_tps,
            avg_tps_1m: self.window.smoothed(),
            cost_per_mtoken: self.costs.cost_per_mtoken_usd,
            energy_per_mtoken: self.costs.energy_per_mtoken_wh,
            health_status: self.health.status.score(),
            health: self.health.clone(),
            hardware: self.hardware,
            last_vendor_count: self.drift.last_vendor_count(),
            last_inference_count: self.drift.last_inference_count(),
            reconcile_accuracy: self.last_drift.map(|d| d.accuracy_pct()),
            last_capture_timestamp: self.last_capture_timestamp,
            last_updated: self.last_update.timestamp(),
        }
    }
}

/// Point-in-time view of a device, as served by the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub gpu_uuid: String,
    pub gpu_sku: String,
    pub sku_fallback: bool,
    pub model_id: Option<String>,
    pub tokens_total: u64,
    pub current_tps: f64,
    pub avg_tps_1m: Option<f64>,
    pub cost_per_mtoken: Option<f64>,
    pub energy_per_mtoken: Option<f64>,
    pub health_status: f64,
    pub health: HealthAssessment,
    pub hardware: HardwareState,
    pub last_vendor_count: u64,
    pub last_inference_count: u64,
    /// Accuracy of this device's latest comparison
    pub reconcile_accuracy: Option<f64>,
    pub last_capture_timestamp: Option<i64>,
    /// Unix seconds
    pub last_updated: i64,
}
