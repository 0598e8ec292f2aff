//! # Ingestion Pipeline
//!
//! Meter reading ingestion module.
//!
//! Responsibilities:
//! - Provide reading sources that stand in for the telegram decoder
//!   (NDJSON replay, synthetic profile)
//! - Retry source errors with backoff, surfaced downstream only as missing readings
//! - Backpressure: a full channel drops the newest reading of a live source;
//!   replay and mock sources wait for room
//! - Send to downstream via async-channel
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, ReplaySource};
//!
//! let source = ReplaySource::open("readings.ndjson").await?.with_speed(1.0);
//! let mut pipeline = IngestionPipeline::new(100);
//! let rx = pipeline.take_receiver().unwrap();
//! pipeline.start(source)?;
//! while let Ok(reading) = rx.recv().await {
//!     // Process reading
//! }
//! ```

mod config;
mod error;
mod mock;
mod pipeline;
mod replay;

// Re-exports
pub use config::{Backoff, IngestionConfig, IngestionMetrics, MetricsSnapshot};
pub use contracts::Reading;
pub use error::{IngestionError, Result};
pub use mock::{MockReadingSource, MockSourceConfig};
pub use pipeline::IngestionPipeline;
pub use replay::{ReplaySource, MAX_REPLAY_WAIT};
