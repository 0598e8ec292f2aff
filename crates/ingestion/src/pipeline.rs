//! Ingestion Pipeline main entry

use std::sync::Arc;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{Reading, ReadingSource};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{Backoff, IngestionConfig, IngestionMetrics};
use crate::error::{IngestionError, Result};

/// Ingestion Pipeline
///
/// Drives one reading source into a bounded channel. Source errors are
/// retried with exponential backoff. When the channel is full a live source
/// loses its newest reading so it never waits on its consumers; a paced
/// source (replay, mock) waits for room. The receiver closes when the source
/// reports end of stream.
pub struct IngestionPipeline {
    config: IngestionConfig,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender, handed to the source task on start
    tx: Option<Sender<Reading>>,

    /// Data receiver
    rx: Option<Receiver<Reading>>,

    task: Option<JoinHandle<()>>,
    source_name: Option<String>,
}

impl IngestionPipeline {
    /// Create new Ingestion Pipeline
    ///
    /// # Arguments
    /// * `channel_capacity` - Channel capacity
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_config(IngestionConfig::new(channel_capacity))
    }

    /// Create with custom configuration
    pub fn with_config(config: IngestionConfig) -> Self {
        let (tx, rx) = bounded(config.channel_capacity.max(1));

        Self {
            config,
            metrics: Arc::new(IngestionMetrics::new()),
            tx: Some(tx),
            rx: Some(rx),
            task: None,
            source_name: None,
        }
    }

    /// Start reading from `source`
    ///
    /// # Errors
    /// `AlreadyStarted` when a source was started before.
    #[instrument(name = "ingestion_start", skip(self, source), fields(source = %source.name()))]
    pub fn start<S>(&mut self, source: S) -> Result<()>
    where
        S: ReadingSource + 'static,
    {
        let Some(tx) = self.tx.take() else {
            return Err(IngestionError::AlreadyStarted {
                source_name: self.source_name.clone().unwrap_or_default(),
            });
        };

        let name = source.name().to_string();
        info!(
            source = %name,
            capacity = self.config.channel_capacity,
            live = source.is_live(),
            "starting reading source"
        );
        self.source_name = Some(name);
        self.task = Some(tokio::spawn(run_source(
            source,
            tx,
            self.metrics.clone(),
            Backoff::from(&self.config),
        )));
        Ok(())
    }

    /// Abort the source task; the receiver closes afterwards
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!(source = ?self.source_name, "stopping reading source");
            task.abort();
        }
        self.tx = None;
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<Reading>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Whether the source task is still producing
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_source<S: ReadingSource>(
    mut source: S,
    tx: Sender<Reading>,
    metrics: Arc<IngestionMetrics>,
    mut backoff: Backoff,
) {
    let live = source.is_live();
    loop {
        match source.next_reading().await {
            Ok(Some(reading)) => {
                backoff.reset();
                metrics.record_received();
                let forwarded = if live {
                    forward_or_drop(&tx, reading, &metrics)
                } else {
                    tx.send(reading).await.is_ok()
                };
                if !forwarded {
                    debug!(source = %source.name(), "receiver closed, stopping source");
                    break;
                }
                trace!(source = %source.name(), "reading handled");
                metrics.update_queue_len(tx.len());
            }
            Ok(None) => {
                info!(source = %source.name(), "reading source ended");
                break;
            }
            Err(e) => {
                metrics.record_source_error();
                let delay = backoff.next_delay();
                warn!(source = %source.name(), error = %e, retry_in_ms = delay.as_millis() as u64, "source error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Drop-newest handoff for live sources; `false` once the receiver is gone
fn forward_or_drop(tx: &Sender<Reading>, reading: Reading, metrics: &IngestionMetrics) -> bool {
    match tx.try_send(reading) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            metrics.record_dropped();
            trace!("reading dropped (channel full)");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
