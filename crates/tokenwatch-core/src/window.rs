//! Sliding window of throughput observations

use crate::sample::Origin;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Span of the smoothing window
pub const WINDOW_SPAN: Duration = Duration::from_secs(60);

/// A single throughput observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub observed_at: Instant,
    pub throughput: f64,
    pub origin: Origin,
}

/// Time-ordered throughput observations for one device and their mean
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    entries: VecDeque<WindowEntry>,
    smoothed: Option<f64>,
}

impl ThroughputWindow {
    /// Create an empty window spanning [`WINDOW_SPAN`]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(64),
            smoothed: None,
        }
    }

    /// Record an observation and return the new smoothed throughput.
    ///
    /// The entry is appended before pruning, so the window always holds at least
    /// the new observation afterwards. Entries strictly older than
    /// `observed_at - WINDOW_SPAN` are evicted from the front.
    pub fn update(&mut self, throughput: f64, origin: Origin, observed_at: Instant) -> f64 {
        self.entries.push_back(WindowEntry {
            observed_at,
            throughput,
            origin,
        });

        if let Some(cutoff) = observed_at.checked_sub(WINDOW_SPAN) {
            while self
                .entries
                .front()
                .is_some_and(|entry| entry.observed_at < cutoff)
            {
                self.entries.pop_front();
            }
        }

        let total: f64 = self.entries.iter().map(|e| e.throughput).sum();
        let mean = total / self.entries.len() as f64;
        self.smoothed = Some(mean);
        mean
    }

    /// Mean throughput of the window; `None` until the first observation
    pub fn smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    /// Observations currently in the window, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    /// Number of observations in the window
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window holds no observations
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new()
    }
}
