//! Pipeline configuration, retry backoff and metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Ingestion pipeline configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Channel capacity; a full channel drops the newest reading
    pub channel_capacity: usize,

    /// First retry delay after a source error
    pub initial_backoff: Duration,

    /// Upper bound of the retry delay
    pub max_backoff: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl IngestionConfig {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity,
            ..Default::default()
        }
    }
}

/// Exponential retry delay, doubled per consecutive failure
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much (capped)
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Back to the initial delay after a successful read
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl From<&IngestionConfig> for Backoff {
    fn from(config: &IngestionConfig) -> Self {
        Self::new(config.initial_backoff, config.max_backoff)
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Readings delivered by the source
    pub readings_received: AtomicU64,

    /// Readings dropped because the channel was full
    pub readings_dropped: AtomicU64,

    /// Errors reported by the source
    pub source_errors: AtomicU64,

    /// Current queue length
    pub queue_len: AtomicUsize,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.readings_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("smartmeter_readings_received_total").increment(1);
    }

    pub fn record_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("smartmeter_readings_dropped_total").increment(1);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("smartmeter_source_errors_total").increment(1);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub readings_received: u64,
    pub readings_dropped: u64,
    pub source_errors: u64,
    pub queue_len: usize,
}
