//! Sink metrics for observability
//!
//! Atomics back the in-process snapshot; every update is mirrored to the
//! `metrics` facade so a Prometheus exporter sees the same numbers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug)]
pub struct SinkMetrics {
    sink: String,
    /// Current queue length
    queue_len: AtomicUsize,
    /// Readings handed to the sink successfully
    delivered_count: AtomicU64,
    /// Failed deliveries (one per failed write or batch)
    failure_count: AtomicU64,
    /// Readings dropped because the handoff queue was full
    dropped_count: AtomicU64,
    /// Readings evicted from a full interval buffer
    evicted_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            queue_len: AtomicUsize::new(0),
            delivered_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        ::metrics::gauge!("smartmeter_sink_queue_len", "sink" => self.sink.clone()).set(len as f64);
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    /// Count `readings` delivered in one write or batch
    pub fn add_delivered(&self, readings: u64) {
        self.delivered_count.fetch_add(readings, Ordering::Relaxed);
        ::metrics::counter!(
            "smartmeter_sink_deliveries_total",
            "sink" => self.sink.clone(),
            "status" => "success"
        )
        .increment(1);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(
            "smartmeter_sink_deliveries_total",
            "sink" => self.sink.clone(),
            "status" => "failure"
        )
        .increment(1);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(
            "smartmeter_sink_dropped_total",
            "sink" => self.sink.clone(),
            "reason" => "queue_full"
        )
        .increment(1);
    }

    pub fn evicted_count(&self) -> u64 {
        self.evicted_count.load(Ordering::Relaxed)
    }

    pub fn inc_evicted_count(&self) {
        self.evicted_count.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!(
            "smartmeter_sink_dropped_total",
            "sink" => self.sink.clone(),
            "reason" => "buffer_full"
        )
        .increment(1);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            evicted_count: self.evicted_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub delivered_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub evicted_count: u64,
}
