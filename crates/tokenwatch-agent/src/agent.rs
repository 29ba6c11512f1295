//! The tokenwatch daemon: store, feeds, ingestion and HTTP endpoint

use crate::config::AgentConfig;
use crate::ingest::{
    feed_channels, DcgmReading, FeedReceivers, FeedSenders, IngestStats, Multiplexer,
};
use crate::{server, Result};
use tokenwatch_core::Sample;
use tokenwatch_state::DeviceStore;
use tokio::io::AsyncBufRead;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// The main tokenwatch agent
pub struct Agent {
    config: AgentConfig,
    store: DeviceStore,
    senders: FeedSenders,
    receivers: FeedReceivers,
}

impl Agent {
    /// Build the store and feed channels for a validated configuration
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let store = DeviceStore::new(config.sku_table()?)?;
        let (senders, receivers) = feed_channels(&config.feeds);
        Ok(Self {
            config,
            store,
            senders,
            receivers,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Shared device store
    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    /// Handle for pushing vendor readings; `None` if the vendor feed is disabled
    pub fn vendor_feed(&self) -> Option<mpsc::Sender<DcgmReading>> {
        self.senders.vendor.clone()
    }

    /// Handle for pushing remote inference samples; `None` if the remote feed is disabled
    pub fn remote_feed(&self) -> Option<mpsc::Sender<Sample>> {
        self.senders.remote.clone()
    }

    /// Run until a shutdown signal is received.
    ///
    /// Failing to bind the HTTP endpoint is the only fatal error. When the input
    /// stream ends, ingestion stops but the endpoint keeps serving the last state.
    pub async fn run<R>(self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let Agent {
            config,
            store,
            senders,
            receivers,
        } = self;

        let listener = TcpListener::bind(config.server.listen_addr).await?;
        info!(
            listen = %config.server.listen_addr,
            stdin_enabled = config.feeds.stdin.enabled,
            vendor_enabled = config.feeds.vendor.enabled,
            remote_enabled = config.feeds.remote.enabled,
            "Starting tokenwatch agent"
        );

        let server_store = store.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server::serve(listener, server_store).await {
                error!("HTTP endpoint failed: {}", e);
            }
        });

        // Push feeds stay open only as long as external holders keep their senders
        drop(senders);

        let input = config.feeds.stdin.enabled.then_some(input);
        let multiplexer = Multiplexer::new(store, &config.feeds, receivers, input);
        let mut ingest_handle = tokio::spawn(multiplexer.run());

        tokio::select! {
            result = &mut ingest_handle => {
                log_ingest_result(result);
                wait_for_shutdown().await;
            }
            _ = wait_for_shutdown() => {
                ingest_handle.abort();
            }
        }

        info!("Shutting down tokenwatch agent");
        server_handle.abort();
        Ok(())
    }
}

fn log_ingest_result(result: std::result::Result<IngestStats, tokio::task::JoinError>) {
    match result {
        Ok(stats) => info!(
            applied = stats.applied,
            "Ingestion stopped; still serving the last known state"
        ),
        Err(e) => error!("Ingestion task failed: {}", e),
    }
}

/// Wait for termination signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = signal::ctrl_c() => info!("Received Ctrl+C signal"),
    }
}

/// Wait for termination signals (Windows)
#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = signal::ctrl_c().await;
    info!("Received Ctrl+C signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_agent_feed_handles_follow_config() {
        let agent = Agent::new(AgentConfig::default()).unwrap();
        assert!(agent.vendor_feed().is_none());
        assert!(agent.remote_feed().is_none());
        assert!(agent.store().is_empty());

        let mut config = AgentConfig::default();
        config.feeds.vendor.enabled = true;
        config.feeds.remote.enabled = true;
        let agent = Agent::new(config).unwrap();
        assert!(agent.vendor_feed().is_some());
        assert!(agent.remote_feed().is_some());
    }

    #[test]
    fn test_agent_rejects_invalid_config() {
        let mut config = AgentConfig::default();
        config.logging.format = "xml".to_string();
        assert!(Agent::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_fails_when_port_is_taken() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = AgentConfig::default();
        config.server.listen_addr = occupied.local_addr().unwrap();

        let agent = Agent::new(config).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), agent.run(&b""[..])).await;
        assert!(matches!(result, Ok(Err(crate::AgentError::Io(_)))));
    }
}
