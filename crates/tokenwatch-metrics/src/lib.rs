//! # tokenwatch-metrics
//!
//! Prometheus surfaces for tokenwatch.
//!
//! Every device gets its own set of collectors carrying a constant `gpu_uuid`
//! label. Drift counters are process-wide. Exposition uses the text format.

pub mod device;
pub mod drift;
pub mod export;

pub use device::DeviceMetrics;
pub use drift::DriftMetrics;
pub use export::{encode_text, TEXT_CONTENT_TYPE};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    /// Whether the registry already holds a collector with the same descriptor
    pub fn is_already_registered(&self) -> bool {
        matches!(self, MetricsError::Registry(prometheus::Error::AlreadyReg))
    }
}
