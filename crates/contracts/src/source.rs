//! ReadingSource trait - ingestion input interface
//!
//! The telegram decoder lives behind this trait; the pipeline only sees
//! decoded `Reading` values.

use crate::{ContractError, Reading};

/// Producer of decoded meter readings
#[trait_variant::make(ReadingSource: Send)]
pub trait LocalReadingSource {
    /// Source name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Whether readings arrive on an external clock
    ///
    /// A live source (the meter port) cannot be paused, so the ingestion
    /// channel drops its newest reading when full. File and synthetic sources
    /// return `false` and wait for room instead.
    fn is_live(&self) -> bool;

    /// Wait for the next reading
    ///
    /// Returns `Ok(None)` when the stream has ended.
    ///
    /// # Errors
    /// `ContractError::Source` for a transient failure; the caller retries.
    async fn next_reading(&mut self) -> Result<Option<Reading>, ContractError>;
}
