//! # Dispatcher
//!
//! Reading fan-out.
//!
//! - consumes readings from the ingestion channel
//! - fans out to every enabled sink, each on its own cadence
//! - isolates slow or failing sinks from the source and from each other
//! - feeds load workers through `Dispatcher::subscribe`

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod rotation;
pub mod sinks;

pub use contracts::{DataSink, Reading};
pub use dispatcher::{
    create_dispatcher, DispatchReport, Dispatcher, DispatcherBuilder, DispatcherConfig, SinkSpec,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use rotation::{RotationPolicy, RotationState, RotationTrigger};
pub use sinks::{CsvSink, InfluxSink, LogSink, TelegramSink};
