//! Dispatcher - main loop for fan-out to sinks

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{ApplianceConfig, CsvConfig, InfluxConfig, Reading, SinkConfig, TelegramConfig};
use load_control::LoadStatus;

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{CsvSink, InfluxSink, LogSink, TelegramSink};

/// Time each sink gets to drain and close on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// One configured output
#[derive(Debug, Clone)]
pub enum SinkSpec {
    Csv(CsvConfig),
    Influx(InfluxConfig),
    Telegram(TelegramConfig),
    /// Tracing output of every reading
    Log(SinkConfig),
}

impl SinkSpec {
    /// Dispatch settings derived from the section
    pub fn settings(&self) -> SinkConfig {
        match self {
            Self::Csv(c) => c.sink_config(),
            Self::Influx(c) => c.sink_config(),
            Self::Telegram(c) => c.sink_config(),
            Self::Log(c) => c.clone(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations, disabled ones included
    pub sinks: Vec<SinkSpec>,
    pub shutdown_timeout: Duration,
}

impl DispatcherConfig {
    /// CSV, Influx and Telegram sections of the appliance config
    pub fn from_appliance(config: &ApplianceConfig) -> Self {
        Self {
            sinks: vec![
                SinkSpec::Csv(config.csv.clone()),
                SinkSpec::Influx(config.influx.clone()),
                SinkSpec::Telegram(config.telegram.clone()),
            ],
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Add a log sink receiving every reading
    pub fn with_log_sink(mut self) -> Self {
        self.sinks.push(SinkSpec::Log(SinkConfig::immediate("log")));
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Names of the sinks that will be constructed
    pub fn enabled_sinks(&self) -> Vec<String> {
        self.sinks
            .iter()
            .map(SinkSpec::settings)
            .filter(|s| s.enabled)
            .map(|s| s.name)
            .collect()
    }
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: Receiver<Reading>,
    loads: Option<LoadStatus>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: Receiver<Reading>) -> Self {
        Self {
            config,
            input_rx,
            loads: None,
        }
    }

    /// Load states reported by the Telegram sink
    pub fn with_load_status(mut self, loads: LoadStatus) -> Self {
        self.loads = Some(loads);
        self
    }

    /// Build the sinks and spawn their workers
    ///
    /// Disabled sinks are skipped; they never see a reading.
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut handles = Vec::with_capacity(self.config.sinks.len());
        for spec in &self.config.sinks {
            let settings = spec.settings();
            if !settings.enabled {
                info!(sink = %settings.name, "sink is not enabled");
                continue;
            }
            handles.push(create_sink_handle(spec, &settings, self.loads.as_ref())?);
        }

        Ok(Dispatcher::with_handles(handles, self.input_rx)
            .with_shutdown_timeout(self.config.shutdown_timeout))
    }
}

/// Create a SinkHandle from configuration
#[instrument(name = "dispatcher_create_sink_handle", skip_all, fields(sink = %settings.name))]
fn create_sink_handle(
    spec: &SinkSpec,
    settings: &SinkConfig,
    loads: Option<&LoadStatus>,
) -> Result<SinkHandle, DispatcherError> {
    let creation = |e: contracts::ContractError| DispatcherError::sink_creation(&settings.name, e.to_string());

    let handle = match spec {
        SinkSpec::Csv(config) => {
            let sink = CsvSink::new(&settings.name, config).map_err(creation)?;
            SinkHandle::spawn(sink, settings)
        }
        SinkSpec::Influx(config) => {
            let sink = InfluxSink::new(&settings.name, config).map_err(creation)?;
            SinkHandle::spawn(sink, settings)
        }
        SinkSpec::Telegram(config) => {
            let mut sink = TelegramSink::new(&settings.name, config).map_err(creation)?;
            if let Some(loads) = loads {
                sink = sink.with_load_status(loads.clone());
            }
            SinkHandle::spawn(sink, settings)
        }
        SinkSpec::Log(_) => SinkHandle::spawn(LogSink::new(&settings.name), settings),
    };

    info!(
        sink = %settings.name,
        mode = ?handle.mode(),
        queue_capacity = settings.queue_capacity,
        "added sink"
    );
    Ok(handle)
}

/// Consumer of the reading stream outside the sink set (load workers)
struct Subscriber {
    name: String,
    tx: mpsc::Sender<Arc<Reading>>,
}

/// Outcome of a dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Readings taken from the input
    pub readings: u64,
    /// Final metrics of every sink
    pub sinks: Vec<(String, MetricsSnapshot)>,
    /// Sinks that did not finish within the shutdown timeout
    pub timed_out: Vec<String>,
}

/// The main Dispatcher that fans out readings to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    subscribers: Vec<Subscriber>,
    input_rx: Receiver<Reading>,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: Receiver<Reading>) -> Self {
        Self {
            handles,
            subscribers: Vec::new(),
            input_rx,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Receive every reading through a bounded channel of `capacity`
    ///
    /// A full subscriber channel drops the reading for that subscriber only.
    pub fn subscribe(&mut self, name: impl Into<String>, capacity: usize) -> mpsc::Receiver<Arc<Reading>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.push(Subscriber {
            name: name.into(),
            tx,
        });
        rx
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.handles.iter().map(SinkHandle::name).collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Hand one reading to every sink and subscriber without waiting
    ///
    /// Returns the number of sinks that accepted it.
    pub fn dispatch(&self, reading: Reading) -> usize {
        ::metrics::gauge!("smartmeter_net_power_watts").set(reading.power_w);
        ::metrics::counter!("smartmeter_readings_dispatched_total").increment(1);

        let reading = Arc::new(reading);
        let accepted = self
            .handles
            .iter()
            .filter(|h| h.try_send(Arc::clone(&reading)))
            .count();

        for subscriber in &self.subscribers {
            if let Err(mpsc::error::TrySendError::Full(_)) = subscriber.tx.try_send(Arc::clone(&reading)) {
                warn!(subscriber = %subscriber.name, "subscriber queue full, reading dropped");
                ::metrics::counter!(
                    "smartmeter_subscriber_dropped_total",
                    "subscriber" => subscriber.name.clone()
                )
                .increment(1);
            }
        }
        accepted
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes readings from input and fans out to all sinks.
    /// Returns when input channel is closed and every sink has shut down.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchReport {
        info!(
            sinks = self.handles.len(),
            subscribers = self.subscribers.len(),
            "Dispatcher started"
        );

        let mut reading_count: u64 = 0;

        while let Ok(reading) = self.input_rx.recv().await {
            reading_count += 1;
            self.dispatch(reading);

            if reading_count.is_multiple_of(100) {
                debug!(readings = reading_count, "Dispatcher progress");
            }
        }

        info!(readings = reading_count, "Dispatcher input closed, shutting down");

        // closes the subscriber streams
        self.subscribers.clear();

        let sink_metrics: Vec<_> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect();
        let timed_out = Self::shutdown_handles(self.handles, self.shutdown_timeout).await;
        let sinks = sink_metrics
            .into_iter()
            .map(|(name, metrics)| (name, metrics.snapshot()))
            .collect();

        info!("Dispatcher shutdown complete");

        DispatchReport {
            readings: reading_count,
            sinks,
            timed_out,
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>, timeout: Duration) -> Vec<String> {
        let mut timed_out = Vec::new();
        for handle in handles {
            if let Err(DispatcherError::ShutdownTimeout { name, .. }) = handle.shutdown(timeout).await {
                timed_out.push(name);
            }
        }
        timed_out
    }
}

/// Convenience function to create a dispatcher from the appliance config
#[instrument(name = "dispatcher_create", skip_all)]
pub fn create_dispatcher(
    config: &ApplianceConfig,
    input_rx: Receiver<Reading>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(DispatcherConfig::from_appliance(config), input_rx).build()
}
