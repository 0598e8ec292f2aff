//! SinkHandle - manages a sink with isolated queue and worker task
//!
//! Each sink runs in its own task behind a bounded channel. Immediate sinks
//! write every reading as it arrives; interval sinks collect readings in a
//! bounded buffer and deliver them once per period.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, warn};

use contracts::{BatchPolicy, DataSink, DispatchMode, Reading, SinkConfig};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    mode: DispatchMode,
    /// Channel to send readings to worker
    tx: mpsc::Sender<Arc<Reading>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + 'static>(sink: S, config: &SinkConfig) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new(&name));
        let mode = config.mode();

        let worker = SinkWorker {
            sink,
            rx,
            metrics: Arc::clone(&metrics),
            name: name.clone(),
        };

        let worker_handle = match mode {
            DispatchMode::Immediate => tokio::spawn(worker.run_immediate()),
            DispatchMode::Interval(period) => {
                let buffer = IntervalBuffer::new(config.buffer_capacity);
                let first_tick = Instant::now() + period;
                tokio::spawn(worker.run_interval(period, first_tick, buffer, config.batch))
            }
        };

        debug!(sink = %name, ?mode, "sink worker spawned");

        Self {
            name,
            mode,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Send a reading to the sink (non-blocking)
    ///
    /// Returns true if sent, false if queue full (reading dropped)
    pub fn try_send(&self, reading: Arc<Reading>) -> bool {
        match self.tx.try_send(reading) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(r)) => {
                self.metrics.inc_dropped_count();
                warn!(sink = %self.name, timestamp = %r.timestamp, "queue full, reading dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// The worker drains its queue, delivers what is still buffered, then
    /// flushes and closes the sink. A worker still busy after `timeout` is
    /// aborted.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self, timeout: Duration) -> Result<(), DispatcherError> {
        let Self {
            name,
            tx,
            mut worker_handle,
            ..
        } = self;
        // Drop sender to signal worker to stop
        drop(tx);

        match tokio::time::timeout(timeout, &mut worker_handle).await {
            Ok(Ok(())) => {
                debug!(sink = %name, "SinkHandle shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(sink = %name, error = ?e, "worker task panicked");
                Ok(())
            }
            Err(_) => {
                worker_handle.abort();
                warn!(sink = %name, timeout_ms = timeout.as_millis() as u64, "sink shutdown timed out");
                Err(DispatcherError::ShutdownTimeout {
                    name,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Bounded FIFO of readings waiting for the next interval flush
#[derive(Debug)]
pub(crate) struct IntervalBuffer {
    readings: VecDeque<Arc<Reading>>,
    capacity: usize,
}

impl IntervalBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a reading, returning the evicted oldest one when full
    pub(crate) fn push(&mut self, reading: Arc<Reading>) -> Option<Arc<Reading>> {
        let evicted = if self.readings.len() >= self.capacity {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.readings.len()
    }

    /// Take the whole window, leaving the buffer empty
    pub(crate) fn take(&mut self) -> Vec<Arc<Reading>> {
        self.readings.drain(..).collect()
    }
}

struct SinkWorker<S> {
    sink: S,
    rx: mpsc::Receiver<Arc<Reading>>,
    metrics: Arc<SinkMetrics>,
    name: String,
}

impl<S: DataSink> SinkWorker<S> {
    #[instrument(name = "sink_worker_immediate", skip(self), fields(sink = %self.name))]
    async fn run_immediate(mut self) {
        debug!("sink worker started");

        while let Some(reading) = self.rx.recv().await {
            self.metrics.set_queue_len(self.rx.len());

            match self.sink.write(&reading).await {
                Ok(()) => self.metrics.add_delivered(1),
                Err(e) => {
                    self.metrics.inc_failure_count();
                    error!(
                        sink = %self.name,
                        timestamp = %reading.timestamp,
                        error = %e,
                        "write failed"
                    );
                }
            }
        }

        self.finish().await;
    }

    #[instrument(
        name = "sink_worker_interval",
        skip(self, buffer),
        fields(sink = %self.name, period_secs = period.as_secs())
    )]
    async fn run_interval(
        mut self,
        period: Duration,
        first_tick: Instant,
        mut buffer: IntervalBuffer,
        batch: BatchPolicy,
    ) {
        debug!("sink worker started");

        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(reading) => {
                        self.metrics.set_queue_len(self.rx.len());
                        if let Some(evicted) = buffer.push(reading) {
                            self.metrics.inc_evicted_count();
                            warn!(
                                sink = %self.name,
                                timestamp = %evicted.timestamp,
                                "interval buffer full, oldest reading dropped"
                            );
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    self.deliver(buffer.take(), batch).await;
                }
            }
        }

        // what is left of the current window goes out once
        self.deliver(buffer.take(), batch).await;
        self.finish().await;
    }

    /// Hand one window to the sink; a failed window is discarded
    async fn deliver(&mut self, window: Vec<Arc<Reading>>, batch: BatchPolicy) {
        if window.is_empty() {
            return;
        }
        let buffered = window.len();

        let (result, delivered) = match batch {
            BatchPolicy::Latest => {
                let latest = &window[buffered - 1];
                (self.sink.write(latest).await, 1)
            }
            BatchPolicy::All => {
                let readings: Vec<Reading> = window.iter().map(|r| Reading::clone(r)).collect();
                (self.sink.write_batch(&readings).await, buffered)
            }
        };

        match result {
            Ok(()) => {
                self.metrics.add_delivered(delivered as u64);
                debug!(sink = %self.name, buffered, delivered, "interval delivery");
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                error!(sink = %self.name, buffered, error = %e, "interval delivery failed, batch discarded");
            }
        }
    }

    async fn finish(mut self) {
        if let Err(e) = self.sink.flush().await {
            error!(sink = %self.name, error = %e, "flush failed on shutdown");
        }
        if let Err(e) = self.sink.close().await {
            error!(sink = %self.name, error = %e, "close failed on shutdown");
        }
        debug!(sink = %self.name, "sink worker stopped");
    }
}
