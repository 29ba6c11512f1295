//! Configuration for the tokenwatch daemon

use crate::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokenwatch_core::{SkuProfile, SkuTable};

/// Environment variable prefix for overrides, e.g. `TOKENWATCH_SERVER__LISTEN_ADDR`
pub const ENV_PREFIX: &str = "TOKENWATCH";

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// HTTP endpoint
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Sample sources
    pub feeds: FeedsConfig,

    /// SKU profiles
    pub skus: SkusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address serving /metrics, /health and /gpu/metrics
    pub listen_addr: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target module in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Line-delimited JSON samples on standard input
    pub stdin: StreamFeedConfig,

    /// Vendor hardware-counter readings
    pub vendor: VendorFeedConfig,

    /// Samples pushed by remote inference services
    pub remote: PushFeedConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFeedConfig {
    pub enabled: bool,

    /// SKU assigned to devices first seen on this feed
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorFeedConfig {
    pub enabled: bool,

    /// SKU assigned to devices first seen on this feed
    pub sku: String,

    /// Observation window of one reading, in seconds
    pub window_secs: u64,

    /// Channel capacity
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFeedConfig {
    pub enabled: bool,

    /// SKU assigned to devices first seen on this feed
    pub sku: String,

    /// Channel capacity
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkusConfig {
    /// YAML file holding a full SKU table; replaces the inline profiles when set
    pub file: Option<PathBuf>,

    /// SKU used when a feed reports an unknown one
    pub default_sku: String,

    /// Inline profiles
    pub profiles: Vec<SkuProfile>,
}

impl AgentConfig {
    /// Load configuration with precedence, lowest first: defaults, the optional
    /// YAML file, `TOKENWATCH_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            let file = config::File::from(path.to_path_buf()).format(config::FileFormat::Yaml);
            builder = builder.add_source(file);
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(AgentError::Config(format!("Unknown log format: {}", other)));
            }
        }

        let feeds = &self.feeds;
        if !feeds.stdin.enabled && !feeds.vendor.enabled && !feeds.remote.enabled {
            return Err(AgentError::Config("At least one feed must be enabled".to_string()));
        }
        if feeds.vendor.enabled && feeds.vendor.window_secs == 0 {
            return Err(AgentError::Config("Vendor window must be positive".to_string()));
        }
        if feeds.vendor.enabled && feeds.vendor.channel_capacity == 0 {
            return Err(AgentError::Config(
                "Vendor channel capacity must be positive".to_string(),
            ));
        }
        if feeds.remote.enabled && feeds.remote.channel_capacity == 0 {
            return Err(AgentError::Config(
                "Remote channel capacity must be positive".to_string(),
            ));
        }

        if self.skus.file.is_none() {
            self.sku_table()?;
        }

        Ok(())
    }

    /// Extra checks for the standalone daemon.
    ///
    /// `tokenwatchd` only has standard input as a producer. The vendor and remote
    /// feeds are fed by an embedding caller through [`crate::Agent::vendor_feed`] and
    /// [`crate::Agent::remote_feed`], so a daemon config without the stream feed
    /// would ingest nothing.
    pub fn validate_for_daemon(&self) -> Result<()> {
        if !self.feeds.stdin.enabled {
            return Err(AgentError::Config(
                "tokenwatchd reads samples from standard input; enable feeds.stdin".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the SKU table, reading `skus.file` if it is set
    pub fn sku_table(&self) -> Result<SkuTable> {
        let table = match &self.skus.file {
            Some(path) => SkuTable::from_file(path)?,
            None => SkuTable::new(self.skus.profiles.clone(), self.skus.default_sku.clone())?,
        };
        Ok(table)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            feeds: FeedsConfig::default(),
            skus: SkusConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            stdin: StreamFeedConfig {
                enabled: true,
                sku: "A100".to_string(),
            },
            vendor: VendorFeedConfig {
                enabled: false,
                sku: "A100".to_string(),
                window_secs: 5,
                channel_capacity: 100,
            },
            remote: PushFeedConfig {
                enabled: false,
                sku: "H100".to_string(),
                channel_capacity: 100,
            },
        }
    }
}

impl Default for SkusConfig {
    fn default() -> Self {
        let builtin = SkuTable::builtin();
        Self {
            file: None,
            default_sku: builtin.default_sku,
            profiles: builtin.profiles,
        }
    }
}
