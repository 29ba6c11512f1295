//! Error handling for tokenwatch
//!
//! Provides the error type shared by the core types and the crates built on top of them.

/// Result type alias for tokenwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for tokenwatch
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sample decoded but is not usable
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid sample error
    pub fn invalid_sample(msg: impl Into<String>) -> Self {
        Self::InvalidSample(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error came from undecodable or unusable input.
    /// Input errors drop the offending sample; everything else is a setup problem.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidSample(_) | Error::Json(_))
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidSample(_) => "invalid_sample",
            Error::InvalidConfiguration(_) => "configuration",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Other(_) => "other",
        }
    }
}
