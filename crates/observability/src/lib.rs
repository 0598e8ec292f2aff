//! # Observability
//!
//! Tracing and Prometheus metrics for the meter appliance.
//!
//! - tracing subscriber (JSON / pretty / compact) to stdout and the log file
//! - size based log file rotation at startup
//! - Prometheus exporter
//! - meter statistics for the end-of-run summary
//!
//! ```ignore
//! let config = ObservabilityConfig::from_logging(&appliance.logging).with_metrics_port(Some(9000));
//! observability::init_with_config(&config)?;
//! ```

pub mod logging;
pub mod metrics;

use anyhow::{Context, Result};
use contracts::LoggingConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

pub use crate::logging::{filter_directive, init_logging, rotate_log_file, LogOverrides, RotatingFile};
pub use crate::metrics::{
    record_load_state, record_reading, CounterSample, MeterStatsAggregator,
    MeterSummary, RunningStats, StatsSummary,
};

/// Observability configuration
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub overrides: LogOverrides,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl ObservabilityConfig {
    pub fn from_logging(logging: &LoggingConfig) -> Self {
        Self {
            logging: logging.clone(),
            ..Default::default()
        }
    }

    pub fn with_overrides(mut self, overrides: LogOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// `Some(0)` is treated as disabled
    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_port = port.filter(|p| *p != 0);
        self
    }
}

/// Initialize tracing and, when a port is set, the Prometheus exporter
pub fn init_with_config(config: &ObservabilityConfig) -> Result<()> {
    init_logging(&config.logging, &config.overrides)?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(metrics_port = ?config.metrics_port, "Observability initialized");
    Ok(())
}

/// Only install the Prometheus recorder
///
/// For callers that set up tracing themselves.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.logging.loglevel, "info");
    }

    #[test]
    fn test_zero_port_disables_exporter() {
        let config = ObservabilityConfig::default().with_metrics_port(Some(0));
        assert_eq!(config.metrics_port, None);
        let config = config.with_metrics_port(Some(9000));
        assert_eq!(config.metrics_port, Some(9000));
    }
}
