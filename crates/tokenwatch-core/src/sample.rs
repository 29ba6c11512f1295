//! Token samples as reported by the vendor and inference measurement paths

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Measurement path a sample was taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Origin {
    /// Hardware counters exposed by the accelerator vendor (DCGM and friends)
    Vendor,
    /// Software counters kept by the inference runtime
    Inference,
    /// Anything else, including a missing tag
    #[default]
    Unspecified,
}

impl Origin {
    /// Parse an origin tag; unknown tags map to `Unspecified`
    pub fn parse(tag: &str) -> Self {
        match tag {
            "vendor" => Origin::Vendor,
            "inference" => Origin::Inference,
            _ => Origin::Unspecified,
        }
    }

    /// Tag as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Vendor => "vendor",
            Origin::Inference => "inference",
            Origin::Unspecified => "unspecified",
        }
    }
}

impl From<Option<String>> for Origin {
    fn from(tag: Option<String>) -> Self {
        tag.as_deref().map(Origin::parse).unwrap_or_default()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token-count observation for a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Device identifier
    pub gpu_uuid: String,

    /// Tokens processed during the observation window
    #[serde(default)]
    pub tokens_processed: u64,

    /// Observation window in nanoseconds
    #[serde(default)]
    pub window_ns: i64,

    /// Model served while the window was open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Measurement path
    #[serde(default)]
    pub origin: Origin,

    /// Capture time in unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Power draw in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_draw_w: Option<f64>,

    /// Temperature in Celsius
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,

    /// Memory in use, MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<f64>,

    /// Utilization percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_utilization_pct: Option<f64>,

    /// Prompt tokens included in `tokens_processed`, if the producer splits them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_prompt: Option<u64>,

    /// Generated tokens included in `tokens_processed`, if the producer splits them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_generated: Option<u64>,
}

impl Sample {
    /// Create a sample with the mandatory fields set
    pub fn new(gpu_uuid: impl Into<String>, tokens_processed: u64, window: Duration) -> Self {
        Self {
            gpu_uuid: gpu_uuid.into(),
            tokens_processed,
            window_ns: i64::try_from(window.as_nanos()).unwrap_or(i64::MAX),
            model_id: None,
            origin: Origin::Unspecified,
            timestamp: None,
            power_draw_w: None,
            temperature_c: None,
            memory_usage_mb: None,
            gpu_utilization_pct: None,
            tokens_prompt: None,
            tokens_generated: None,
        }
    }

    /// Decode and validate a single JSON document
    pub fn from_json_line(line: &str) -> Result<Self> {
        let sample: Sample = serde_json::from_str(line)?;
        sample.validate()?;
        Ok(sample)
    }

    /// Reject samples that cannot be attributed to a device
    pub fn validate(&self) -> Result<()> {
        if self.gpu_uuid.trim().is_empty() {
            return Err(Error::invalid_sample("gpu_uuid is empty"));
        }
        Ok(())
    }

    /// Set the origin tag
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the model identifier
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Set the hardware readings
    pub fn with_hardware(
        mut self,
        power_draw_w: f64,
        temperature_c: f64,
        memory_usage_mb: f64,
        gpu_utilization_pct: f64,
    ) -> Self {
        self.power_draw_w = Some(power_draw_w);
        self.temperature_c = Some(temperature_c);
        self.memory_usage_mb = Some(memory_usage_mb);
        self.gpu_utilization_pct = Some(gpu_utilization_pct);
        self
    }

    /// Set the temperature only
    pub fn with_temperature(mut self, temperature_c: f64) -> Self {
        self.temperature_c = Some(temperature_c);
        self
    }

    /// Observation window, if it is long enough to compute a rate from
    pub fn window(&self) -> Option<Duration> {
        u64::try_from(self.window_ns)
            .ok()
            .filter(|ns| *ns > 0)
            .map(Duration::from_nanos)
    }

    /// Tokens per second over the observation window.
    ///
    /// `None` when the window is zero or negative.
    pub fn throughput(&self) -> Option<f64> {
        self.window()
            .map(|window| self.tokens_processed as f64 / window.as_secs_f64())
    }
}
