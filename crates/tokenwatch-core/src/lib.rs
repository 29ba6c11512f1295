//! # tokenwatch-core
//!
//! Core types and per-device telemetry logic for tokenwatch, a token-throughput
//! exporter for GPU inference fleets.
//!
//! This crate has no I/O beyond config file loading. It includes:
//!
//! - The `Sample` record and its origin tag
//! - The SKU profile table with default fallback
//! - Cost and energy calculators
//! - The 60 second throughput window
//! - Health scoring and vendor/inference drift reconciliation
//! - `DeviceState`, which strings the above together for one device

pub mod calc;
pub mod device;
pub mod drift;
pub mod error;
pub mod health;
pub mod sample;
pub mod sku;
pub mod window;

// Re-export commonly used types at the crate root
pub use calc::{cost_per_million_tokens, energy_per_million_tokens_wh, DerivedCosts};
pub use device::{ApplyOutcome, DeviceSnapshot, DeviceState, HardwareState};
pub use drift::{DriftReading, DriftReconciler, DRIFT_ALERT_THRESHOLD_PCT};
pub use error::{Error, Result};
pub use health::{HealthAssessment, HealthCheck, HealthInputs, HealthStatus};
pub use sample::{Origin, Sample};
pub use sku::{SkuProfile, SkuResolution, SkuTable};
pub use window::{ThroughputWindow, WindowEntry, WINDOW_SPAN};
