//! # tokenwatch-agent
//!
//! The tokenwatch daemon (tokenwatchd).
//!
//! Reads token samples from standard input and from in-process push feeds,
//! folds them into the device store, and serves Prometheus metrics plus a
//! small JSON status API over HTTP.

pub mod agent;
pub mod config;
pub mod ingest;
pub mod server;

// Re-export commonly used types
pub use agent::Agent;
pub use config::AgentConfig;
pub use ingest::{DcgmReading, FeedKind, IngestStats, Multiplexer};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Core error: {0}")]
    Core(#[from] tokenwatch_core::Error),

    #[error("State error: {0}")]
    State(#[from] tokenwatch_state::StateError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging_config: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers)
        .with_writer(std::io::stderr);

    let result = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };
    result.map_err(|e| AgentError::Logging(e.to_string()))
}
