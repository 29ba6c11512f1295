//! # tokenwatch-state
//!
//! Process-scoped state for tokenwatch: the device record store and the
//! drift statistics shared by every device.
//!
//! Both are created once at startup and shared by `Arc`. Records are created
//! lazily on a device's first sample and live for the rest of the process.

pub mod drift;
pub mod store;

pub use drift::DriftState;
pub use store::{DeviceRecord, DeviceStore, StoreStats};

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] tokenwatch_metrics::MetricsError),

    #[error("Core error: {0}")]
    Core(#[from] tokenwatch_core::Error),
}

impl From<prometheus::Error> for StateError {
    fn from(err: prometheus::Error) -> Self {
        StateError::Metrics(err.into())
    }
}
