//! DataSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sink Adapters.

use crate::{ContractError, Reading};

/// Data output trait
///
/// All sink implementations must implement this trait. A sink is owned by
/// exactly one worker, so `&mut self` access is never concurrent.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write a single reading (immediate mode)
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, reading: &Reading) -> Result<(), ContractError>;

    /// Write the readings collected during one interval, oldest first
    async fn write_batch(&mut self, readings: &[Reading]) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
