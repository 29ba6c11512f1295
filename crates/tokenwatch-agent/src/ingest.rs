//! Sample ingestion
//!
//! Three sources feed the device store: vendor hardware-counter readings and
//! remote inference samples arrive over channels, and line-delimited JSON
//! arrives on an input stream. [`Multiplexer`] waits on all of them at once
//! and applies each sample as it arrives.

use crate::config::FeedsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;
use tokenwatch_core::{Origin, Sample};
use tokenwatch_state::DeviceStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Line-delimited JSON on the input stream
    Stream,
    /// Vendor hardware counters
    Vendor,
    /// Remote inference service
    Remote,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedKind::Stream => "stream",
            FeedKind::Vendor => "vendor",
            FeedKind::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// One reading from the vendor's hardware counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcgmReading {
    pub gpu_uuid: String,

    #[serde(rename = "dcgm_gpu_tokens_total", default)]
    pub tokens_total: u64,

    #[serde(rename = "dcgm_power_draw_watts", default)]
    pub power_draw_watts: f64,

    #[serde(rename = "dcgm_temperature_celsius", default)]
    pub temperature_celsius: f64,

    #[serde(rename = "dcgm_memory_used_mb", default)]
    pub memory_used_mb: f64,

    #[serde(rename = "dcgm_gpu_utilization_percent", default)]
    pub utilization_percent: f64,

    /// Capture time, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl DcgmReading {
    /// Convert to a vendor-origin sample covering `window`
    pub fn into_sample(self, window: Duration) -> Sample {
        let mut sample = Sample::new(self.gpu_uuid, self.tokens_total, window)
            .with_origin(Origin::Vendor)
            .with_hardware(
                self.power_draw_watts,
                self.temperature_celsius,
                self.memory_used_mb,
                self.utilization_percent,
            );
        sample.timestamp = self.timestamp;
        sample
    }
}

/// Sending halves of the push feeds; `None` for a disabled feed
#[derive(Debug, Clone, Default)]
pub struct FeedSenders {
    pub vendor: Option<mpsc::Sender<DcgmReading>>,
    pub remote: Option<mpsc::Sender<Sample>>,
}

/// Receiving halves of the push feeds
#[derive(Debug, Default)]
pub struct FeedReceivers {
    pub vendor: Option<mpsc::Receiver<DcgmReading>>,
    pub remote: Option<mpsc::Receiver<Sample>>,
}

/// Create channels for every enabled push feed
pub fn feed_channels(config: &FeedsConfig) -> (FeedSenders, FeedReceivers) {
    let mut senders = FeedSenders::default();
    let mut receivers = FeedReceivers::default();

    if config.vendor.enabled {
        let (tx, rx) = mpsc::channel(config.vendor.channel_capacity);
        senders.vendor = Some(tx);
        receivers.vendor = Some(rx);
    }
    if config.remote.enabled {
        let (tx, rx) = mpsc::channel(config.remote.channel_capacity);
        senders.remote = Some(tx);
        receivers.remote = Some(rx);
    }

    (senders, receivers)
}

/// Counters kept by the multiplexer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Samples applied to the store
    pub applied: u64,
    /// Stream lines that did not decode to a usable sample
    pub decode_failures: u64,
    /// Samples whose window was not positive; applied without a rate
    pub rate_rejected: u64,
    /// Samples the store refused
    pub store_errors: u64,
}

/// Merges the feeds into one ordered application to the store
pub struct Multiplexer<R> {
    store: DeviceStore,
    stream_sku: String,
    vendor_sku: String,
    remote_sku: String,
    vendor_window: Duration,
    vendor: Option<mpsc::Receiver<DcgmReading>>,
    remote: Option<mpsc::Receiver<Sample>>,
    input: Option<Lines<R>>,
    stats: IngestStats,
}

impl<R: AsyncBufRead + Unpin> Multiplexer<R> {
    /// Create a multiplexer. `input` is `None` when the stream feed is disabled.
    pub fn new(
        store: DeviceStore,
        config: &FeedsConfig,
        receivers: FeedReceivers,
        input: Option<R>,
    ) -> Self {
        Self {
            store,
            stream_sku: config.stdin.sku.clone(),
            vendor_sku: config.vendor.sku.clone(),
            remote_sku: config.remote.sku.clone(),
            vendor_window: Duration::from_secs(config.vendor.window_secs),
            vendor: receivers.vendor,
            remote: receivers.remote,
            input: input.map(AsyncBufReadExt::lines),
            stats: IngestStats::default(),
        }
    }

    /// Run until the input stream ends, or until every source has closed when
    /// there is no input stream.
    ///
    /// A closed push feed is dropped from the wait set; the others keep going.
    pub async fn run(mut self) -> IngestStats {
        loop {
            tokio::select! {
                msg = recv_from(self.vendor.as_mut()), if self.vendor.is_some() => match msg {
                    Some(reading) => {
                        let sample = reading.into_sample(self.vendor_window);
                        self.ingest(sample, FeedKind::Vendor);
                    }
                    None => {
                        info!("Vendor feed closed");
                        self.vendor = None;
                    }
                },
                sample = recv_from(self.remote.as_mut()), if self.remote.is_some() => match sample {
                    Some(sample) => self.ingest(sample, FeedKind::Remote),
                    None => {
                        info!("Remote feed closed");
                        self.remote = None;
                    }
                },
                line = next_line(self.input.as_mut()), if self.input.is_some() => match line {
                    Ok(Some(line)) => self.ingest_line(&line),
                    Ok(None) => {
                        info!("Input stream ended");
                        break;
                    }
                    // the offending line is already consumed
                    Err(e) if e.kind() == ErrorKind::InvalidData => {
                        self.stats.decode_failures += 1;
                        warn!(error = %e, "Dropping undecodable line");
                    }
                    Err(e) => {
                        warn!(error = %e, "Input stream failed");
                        break;
                    }
                },
                else => {
                    info!("All feeds closed");
                    break;
                }
            }
        }

        info!(
            applied = self.stats.applied,
            decode_failures = self.stats.decode_failures,
            rate_rejected = self.stats.rate_rejected,
            store_errors = self.stats.store_errors,
            "Sample ingestion finished"
        );
        self.stats
    }

    fn ingest_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match Sample::from_json_line(line) {
            Ok(sample) => self.ingest(sample, FeedKind::Stream),
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(error = %e, category = e.category(), "Dropping undecodable sample");
            }
        }
    }

    fn ingest(&mut self, sample: Sample, feed: FeedKind) {
        if let Err(e) = sample.validate() {
            self.stats.decode_failures += 1;
            warn!(feed = %feed, error = %e, "Dropping invalid sample");
            return;
        }
        if sample.throughput().is_none() {
            self.stats.rate_rejected += 1;
            debug!(
                feed = %feed,
                gpu_uuid = %sample.gpu_uuid,
                window_ns = sample.window_ns,
                "Sample has no usable window, skipping rate update"
            );
        }

        let sku = match feed {
            FeedKind::Stream => &self.stream_sku,
            FeedKind::Vendor => &self.vendor_sku,
            FeedKind::Remote => &self.remote_sku,
        };
        match self.store.apply(&sample, sku) {
            Ok(_) => self.stats.applied += 1,
            Err(e) => {
                self.stats.store_errors += 1;
                warn!(
                    feed = %feed,
                    gpu_uuid = %sample.gpu_uuid,
                    error = %e,
                    "Failed to apply sample"
                );
            }
        }
    }
}

async fn recv_from<T>(rx: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(
    lines: Option<&mut Lines<R>>,
) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
