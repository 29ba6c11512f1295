//! Main binary for the tokenwatch daemon (tokenwatchd)

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokenwatch_agent::{init_logging, Agent, AgentConfig, Result};
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "tokenwatchd")]
#[command(about = "Per-GPU token throughput, cost and drift exporter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address for the HTTP endpoint
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the exporter (default)
    Run,
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate { ref config }) => validate_config(config.clone()),
        Some(Commands::Run) | None => run(&cli).await,
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = AgentConfig::load(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate_for_daemon()?;

    init_logging(&config.logging)?;
    if let Some(ref path) = cli.config {
        info!("Loaded configuration from: {}", path.display());
    }
    if config.feeds.vendor.enabled || config.feeds.remote.enabled {
        warn!("Push feeds are enabled but nothing in tokenwatchd sends to them");
    }

    let agent = Agent::new(config)?;
    if let Err(e) = agent.run(BufReader::new(tokio::io::stdin())).await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    match output {
        Some(path) => {
            config.to_file(&path)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            let yaml = serde_yaml::to_string(&config)?;
            println!("{}", yaml);
        }
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    let loaded = AgentConfig::load(Some(&config_path))
        .and_then(|config| config.validate_for_daemon().map(|()| config));
    match loaded {
        Ok(config) => {
            println!("Configuration is valid: {}", config_path.display());
            println!("  listen: {}", config.server.listen_addr);
            println!("  stdin feed: {}", config.feeds.stdin.enabled);
            println!("  vendor feed: {}", config.feeds.vendor.enabled);
            println!("  remote feed: {}", config.feeds.remote.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration is invalid: {}", e);
            std::process::exit(1);
        }
    }
}
