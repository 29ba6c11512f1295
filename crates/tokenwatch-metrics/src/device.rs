//! Per-device metric surfaces

use crate::Result;
use prometheus::{Counter, Gauge, Opts, Registry};
use tokenwatch_core::{DeviceState, Sample};
use tracing::debug;

/// Collectors for a single device, each carrying a constant `gpu_uuid` label
#[derive(Debug, Clone)]
pub struct DeviceMetrics {
    gpu_uuid: String,

    /// Tokens processed across both origins
    pub tokens_total: Counter,

    /// Instantaneous tokens per second
    pub tps: Gauge,

    /// Tokens per second averaged over the last minute
    pub tps_1m: Gauge,

    /// Prompt tokens processed
    pub tokens_prompt_total: Counter,

    /// Generated tokens
    pub tokens_generated_total: Counter,

    /// USD per million tokens
    pub cost_per_mtoken_usd: Gauge,

    /// Wh per million tokens
    pub energy_per_mtoken_wh: Gauge,

    pub power_draw_watts: Gauge,
    pub temperature_celsius: Gauge,
    pub memory_usage_mb: Gauge,
    pub utilization_percent: Gauge,

    /// 2 = healthy, 1 = warning, 0 = critical
    pub health_status: Gauge,

    /// 1 when the device runs on the default SKU profile
    pub sku_fallback: Gauge,
}

impl DeviceMetrics {
    pub fn new(gpu_uuid: impl Into<String>) -> prometheus::Result<Self> {
        let gpu_uuid = gpu_uuid.into();
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("gpu_uuid", gpu_uuid.as_str())
        };

        Ok(Self {
            tokens_total: Counter::with_opts(
                opts("gpu_tokens_total", "Total tokens processed by GPU")
                    .const_label("origin", "combined"),
            )?,
            tps: Gauge::with_opts(opts("gpu_tps", "Current tokens per second"))?,
            tps_1m: Gauge::with_opts(opts("gpu_tps_1m", "1-minute average tokens per second"))?,
            tokens_prompt_total: Counter::with_opts(opts(
                "gpu_tokens_prompt_total",
                "Total prompt tokens processed",
            ))?,
            tokens_generated_total: Counter::with_opts(opts(
                "gpu_tokens_generated_total",
                "Total tokens generated",
            ))?,
            cost_per_mtoken_usd: Gauge::with_opts(opts(
                "gpu_cost_per_mtoken_usd",
                "Cost per million tokens in USD",
            ))?,
            energy_per_mtoken_wh: Gauge::with_opts(opts(
                "gpu_energy_per_mtoken_wh",
                "Energy per million tokens in Wh",
            ))?,
            power_draw_watts: Gauge::with_opts(opts(
                "gpu_power_draw_watts",
                "GPU power draw in watts",
            ))?,
            temperature_celsius: Gauge::with_opts(opts(
                "gpu_temperature_celsius",
                "GPU temperature in Celsius",
            ))?,
            memory_usage_mb: Gauge::with_opts(opts(
                "gpu_memory_usage_mb",
                "GPU memory usage in MB",
            ))?,
            utilization_percent: Gauge::with_opts(opts(
                "gpu_utilization_percent",
                "GPU utilization percentage",
            ))?,
            health_status: Gauge::with_opts(opts(
                "gpu_health_status",
                "GPU health status (2=healthy, 1=warning, 0=critical)",
            ))?,
            sku_fallback: Gauge::with_opts(opts(
                "gpu_sku_fallback",
                "Whether the GPU uses the default SKU profile (1=fallback, 0=exact)",
            ))?,
            gpu_uuid,
        })
    }

    /// Register all collectors with the given registry
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.tokens_total.clone()))?;
        registry.register(Box::new(self.tps.clone()))?;
        registry.register(Box::new(self.tps_1m.clone()))?;
        registry.register(Box::new(self.tokens_prompt_total.clone()))?;
        registry.register(Box::new(self.tokens_generated_total.clone()))?;
        registry.register(Box::new(self.cost_per_mtoken_usd.clone()))?;
        registry.register(Box::new(self.energy_per_mtoken_wh.clone()))?;
        registry.register(Box::new(self.power_draw_watts.clone()))?;
        registry.register(Box::new(self.temperature_celsius.clone()))?;
        registry.register(Box::new(self.memory_usage_mb.clone()))?;
        registry.register(Box::new(self.utilization_percent.clone()))?;
        registry.register(Box::new(self.health_status.clone()))?;
        registry.register(Box::new(self.sku_fallback.clone()))?;
        debug!(gpu_uuid = %self.gpu_uuid, "Registered device metrics");
        Ok(())
    }

    /// Set the values that are known as soon as the device exists
    pub fn init(&self, state: &DeviceState) {
        self.sku_fallback.set(if state.is_sku_fallback() { 1.0 } else { 0.0 });
        self.health_status.set(state.health().status.score());
    }

    /// Publish the state after `sample` has been applied to it.
    ///
    /// Counters advance by the sample's own counts; gauges mirror the state, and
    /// readings the device has never reported are left alone.
    pub fn publish(&self, sample: &Sample, state: &DeviceState) {
        self.tokens_total.inc_by(sample.tokens_processed as f64);
        if let Some(prompt) = sample.tokens_prompt.filter(|n| *n > 0) {
            self.tokens_prompt_total.inc_by(prompt as f64);
        }
        if let Some(generated) = sample.tokens_generated.filter(|n| *n > 0) {
            self.tokens_generated_total.inc_by(generated as f64);
        }

        self.tps.set(state.current_tps());
        set_if_known(&self.tps_1m, state.smoothed_tps());

        let costs = state.costs();
        set_if_known(&self.cost_per_mtoken_usd, costs.cost_per_mtoken_usd);
        set_if_known(&self.energy_per_mtoken_wh, costs.energy_per_mtoken_wh);

        let hardware = state.hardware();
        set_if_known(&self.power_draw_watts, hardware.power_draw_w);
        set_if_known(&self.temperature_celsius, hardware.temperature_c);
        set_if_known(&self.memory_usage_mb, hardware.memory_usage_mb);
        set_if_known(&self.utilization_percent, hardware.gpu_utilization_pct);

        self.health_status.set(state.health().status.score());
    }

    pub fn gpu_uuid(&self) -> &str {
        &self.gpu_uuid
    }
}

fn set_if_known(gauge: &Gauge, value: Option<f64>) {
    if let Some(value) = value {
        gauge.set(value);
    }
}
