//! LogSink - logs reading summary via tracing

use contracts::{ContractError, DataSink, Reading};
use tracing::{info, instrument};

/// Sink that logs reading summaries for debugging
pub struct LogSink {
    name: String,
    count: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: 0,
        }
    }

    /// Readings logged so far
    pub fn count(&self) -> u64 {
        self.count
    }

    fn log_reading_summary(&mut self, reading: &Reading) {
        self.count += 1;
        info!(
            sink = %self.name,
            timestamp = %reading.timestamp,
            power_w = reading.power_w,
            tariff = reading.tariff.map(|t| t.as_str()).unwrap_or("-"),
            phases = reading.phases.len(),
            gas = reading.gas.is_some(),
            "reading received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_write", skip(self, reading), fields(sink = %self.name))]
    async fn write(&mut self, reading: &Reading) -> Result<(), ContractError> {
        self.log_reading_summary(reading);
        Ok(())
    }

    async fn write_batch(&mut self, readings: &[Reading]) -> Result<(), ContractError> {
        for reading in readings {
            self.log_reading_summary(reading);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, readings = self.count, "LogSink closed");
        Ok(())
    }
}
