//! Prometheus text exposition

use crate::{MetricsError, Result};
use prometheus::{Encoder, Registry, TextEncoder};

/// Content type of the text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode everything in the registry in the text exposition format
pub fn encode_text(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MetricsError::Export(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| MetricsError::Export(format!("Failed to convert metrics to string: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceMetrics, DriftMetrics};

    #[test]
    fn test_encode_includes_const_labels() {
        let registry = Registry::new();
        let device = DeviceMetrics::new("GPU-abc").unwrap();
        device.register(&registry).unwrap();
        DriftMetrics::new().unwrap().register(&registry).unwrap();
        device.tokens_total.inc_by(42.0);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("gpu_tokens_total{gpu_uuid=\"GPU-abc\",origin=\"combined\"} 42"));
        assert!(text.contains("gpu_token_drift_total 0"));
        assert!(text.contains("# TYPE gpu_tps gauge"));
    }

    #[test]
    fn test_encode_empty_registry() {
        let text = encode_text(&Registry::new()).unwrap();
        assert!(text.is_empty());
    }
}
