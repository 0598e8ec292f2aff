//! Mock reading source
//!
//! Used for runs and tests without a meter attached.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Clock, ContractError, EnergyCounters, Reading, ReadingSource, SystemClock, Tariff};
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};

/// Mock source configuration
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// Source name
    pub name: String,

    /// Net power values (W) cycled through, negative = export
    pub profile: Vec<f64>,

    /// Time between two readings
    pub period: Duration,

    /// End the stream after this many readings
    pub limit: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            profile: vec![-1800.0, -1800.0, -1750.0, -400.0, 300.0, -2100.0],
            period: Duration::from_secs(1),
            limit: None,
        }
    }
}

/// Synthetic meter
///
/// Emits the profile in a loop and integrates the energy counters from it.
pub struct MockReadingSource {
    config: MockSourceConfig,
    clock: Arc<dyn Clock>,
    index: usize,
    emitted: u64,
    counters: EnergyCounters,
}

impl MockReadingSource {
    pub fn new(config: MockSourceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with an explicit clock for the reading timestamps
    pub fn with_clock(config: MockSourceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.profile.is_empty() {
            return Err(IngestionError::EmptyProfile);
        }
        debug!(source = %config.name, values = config.profile.len(), "mock source created");
        Ok(Self {
            config,
            clock,
            index: 0,
            emitted: 0,
            counters: EnergyCounters::default(),
        })
    }

    /// Constant net power
    pub fn constant(power_w: f64, period: Duration) -> Result<Self> {
        Self::new(MockSourceConfig {
            profile: vec![power_w],
            period,
            ..Default::default()
        })
    }

    fn accumulate(&mut self, power_w: f64) {
        let kwh = power_w.abs() * self.config.period.as_secs_f64() / 3_600_000.0;
        if power_w >= 0.0 {
            self.counters.consumption_day_kwh += kwh;
        } else {
            self.counters.injection_day_kwh += kwh;
        }
    }
}

impl ReadingSource for MockReadingSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn next_reading(&mut self) -> std::result::Result<Option<Reading>, ContractError> {
        if self
            .config
            .limit
            .is_some_and(|limit| self.emitted >= limit)
        {
            return Ok(None);
        }

        if self.emitted > 0 {
            tokio::time::sleep(self.config.period).await;
        }

        let power_w = self.config.profile[self.index];
        self.index = (self.index + 1) % self.config.profile.len();
        self.emitted += 1;
        self.accumulate(power_w);

        let mut reading = Reading::new(self.clock.wall_clock().fixed_offset(), power_w);
        reading.counters = self.counters;
        reading.tariff = Some(Tariff::Day);

        trace!(source = %self.config.name, power_w, seq = self.emitted, "mock reading");
        Ok(Some(reading))
    }
}
