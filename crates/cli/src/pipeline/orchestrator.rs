//! Pipeline orchestrator - coordinates all components.
//!
//! source -> ingestion -> relay (stats, limits) -> dispatcher -> sinks
//!                                                          \-> load workers
//! finished CSV files -> periodic uploader -> object store

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{ApplianceConfig, Reading};
use dispatcher::{DispatcherBuilder, DispatcherConfig};
use ingestion::{IngestionPipeline, MockReadingSource, MockSourceConfig, ReplaySource};
use load_control::{ActuatorOptions, LoadManager};
use observability::{record_load_state, record_reading, MeterStatsAggregator};
use tracing::{debug, info, warn};
use uploader::{CsvUploader, S3Store, StoreCredentials, UploadTask};

use super::PipelineStats;

/// Where readings come from
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// Recorded readings, one JSON object per line
    Replay {
        path: PathBuf,
        speed: f64,
        looped: bool,
    },
    /// Synthetic readings cycling through `profile`
    Mock { profile: Vec<f64>, period: Duration },
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated appliance configuration
    pub appliance: ApplianceConfig,

    pub source: SourceSpec,

    /// Stop after this many readings (None = unlimited)
    pub max_readings: Option<u64>,

    /// Run time limit (None = no limit)
    pub timeout: Option<Duration>,

    /// Channel buffer size
    pub buffer_size: usize,

    pub actuator: ActuatorOptions,

    /// Add a sink that logs every reading
    pub log_readings: bool,
}

/// Why the relay loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    SourceEnded,
    MaxReadings,
    Timeout,
    Signal,
    DispatcherClosed,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the source ends, a limit is hit or `shutdown` resolves
    ///
    /// Every sink is flushed and closed and every load worker joined before
    /// this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let config = self.config;
        let buffer_size = config.buffer_size.max(1);

        // Loads
        let loads = LoadManager::from_config(&config.appliance, &config.actuator)
            .context("Failed to set up loads")?;
        loads.prepare().await.context("Failed to prepare loads")?;
        info!(loads = ?loads.names(), dry_run = config.actuator.dry_run, "Loads ready");

        // Upload of finished CSV files
        let upload_task = match config.appliance.upload.period() {
            Some(period) => Some(start_upload(&config.appliance, period)?),
            None => None,
        };

        // Ingestion
        let mut ingestion = IngestionPipeline::new(buffer_size);
        start_source(&mut ingestion, &config.source).await?;
        let ingestion_rx = ingestion
            .take_receiver()
            .context("Failed to get ingestion receiver")?;
        let ingestion_metrics = ingestion.metrics();

        // Dispatcher
        let (relay_tx, relay_rx) = async_channel::bounded::<Reading>(buffer_size);
        let mut dispatcher_config = DispatcherConfig::from_appliance(&config.appliance);
        if config.log_readings {
            dispatcher_config = dispatcher_config.with_log_sink();
        }
        let sink_names = dispatcher_config.enabled_sinks();
        if sink_names.is_empty() {
            warn!("No sinks enabled - readings are only used for load control");
        }
        let mut dispatcher = DispatcherBuilder::new(dispatcher_config, relay_rx)
            .with_load_status(loads.status())
            .build()
            .context("Failed to create dispatcher")?;

        let load_tasks = loads.spawn(|name| dispatcher.subscribe(name, buffer_size));
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = ?sink_names, load_workers = load_tasks.len(), "Dispatcher started");

        // Relay
        let mut meter = MeterStatsAggregator::new();
        let mut readings = 0u64;
        let max_readings = config.max_readings;
        let deadline = run_deadline(config.timeout);
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        info!(max_readings = ?max_readings, timeout = ?config.timeout, "Pipeline running");

        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Signal,
                _ = &mut deadline => break StopReason::Timeout,
                received = ingestion_rx.recv() => {
                    let Ok(reading) = received else {
                        break StopReason::SourceEnded;
                    };

                    record_reading(&reading);
                    meter.update(&reading);
                    debug!(power_w = reading.power_w, timestamp = %reading.timestamp, "Reading received");

                    if relay_tx.send(reading).await.is_err() {
                        break StopReason::DispatcherClosed;
                    }
                    readings += 1;

                    if max_readings.is_some_and(|max| readings >= max) {
                        break StopReason::MaxReadings;
                    }
                }
            }
        };

        match reason {
            StopReason::SourceEnded => info!(readings, "Reading source ended"),
            StopReason::MaxReadings => info!(readings, "Reached max readings limit"),
            StopReason::Timeout => warn!(readings, "Run time limit reached"),
            StopReason::Signal => warn!(readings, "Shutdown requested, stopping pipeline"),
            StopReason::DispatcherClosed => warn!(readings, "Dispatcher channel closed"),
        }

        // Shutdown: stop the source, let the dispatcher drain and flush, then join loads
        info!("Shutting down pipeline...");
        ingestion.stop();
        drop(relay_tx);

        let report = dispatcher_handle.await.context("Dispatcher task failed")?;
        if !report.timed_out.is_empty() {
            warn!(sinks = ?report.timed_out, "Sinks did not finish in time");
        }

        // the CSV sink is closed now, so its last file goes with the final pass
        let upload = match upload_task {
            Some(task) => Some(task.finish().await),
            None => None,
        };

        let load_snapshots = load_tasks.join().await;
        for snapshot in &load_snapshots {
            record_load_state(&snapshot.name, snapshot.state);
        }

        let stats = PipelineStats {
            readings,
            duration: start_time.elapsed(),
            interrupted: reason == StopReason::Signal,
            timed_out: reason == StopReason::Timeout,
            meter: meter.summary().with_loads(load_snapshots),
            dispatched: report.readings,
            sinks: report.sinks,
            sink_timeouts: report.timed_out,
            ingestion: ingestion_metrics.snapshot(),
            upload,
        };

        info!(
            readings = stats.readings,
            duration_secs = stats.duration.as_secs_f64(),
            rate = stats.readings_per_sec(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

async fn start_source(ingestion: &mut IngestionPipeline, source: &SourceSpec) -> Result<()> {
    match source {
        SourceSpec::Replay { path, speed, looped } => {
            info!(path = %path.display(), speed, looped, "Running in REPLAY mode");
            let replay = ReplaySource::open(path)
                .await
                .with_context(|| format!("Failed to open replay file {}", path.display()))?
                .with_speed(*speed)
                .with_loop(*looped);
            ingestion.start(replay)?;
        }
        SourceSpec::Mock { profile, period } => {
            info!(values = profile.len(), period_secs = period.as_secs_f64(), "Running in MOCK mode");
            let mock = MockReadingSource::new(MockSourceConfig {
                profile: profile.clone(),
                period: *period,
                ..Default::default()
            })?;
            ingestion.start(mock)?;
        }
    }
    Ok(())
}

fn start_upload(appliance: &ApplianceConfig, period: Duration) -> Result<UploadTask<S3Store>> {
    let credentials = StoreCredentials::from_env().context("Periodic upload needs object store credentials")?;
    let store = S3Store::new(&appliance.upload, &credentials).context("Failed to set up object store")?;
    Ok(CsvUploader::new(store, &appliance.csv)
        .with_key_prefix(&appliance.upload.key_prefix)
        .spawn_periodic(period))
}

async fn run_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}
