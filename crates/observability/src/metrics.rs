//! Meter metrics
//!
//! Prometheus recording helpers plus an in-memory aggregator for the summary
//! printed when a run ends.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use contracts::{LoadSnapshot, PowerState, Reading};
use metrics::{counter, gauge, histogram};

/// Record the gauges of one reading
pub fn record_reading(reading: &Reading) {
    counter!("smartmeter_readings_processed_total").increment(1);
    gauge!("smartmeter_power_consumption_watts").set(reading.consumption_w());
    gauge!("smartmeter_power_injection_watts").set(reading.injection_w());
    histogram!("smartmeter_net_power_watts_hist").record(reading.power_w);

    let c = &reading.counters;
    gauge!("smartmeter_energy_consumed_kwh", "tariff" => "day").set(c.consumption_day_kwh);
    gauge!("smartmeter_energy_consumed_kwh", "tariff" => "night").set(c.consumption_night_kwh);
    gauge!("smartmeter_energy_injected_kwh", "tariff" => "day").set(c.injection_day_kwh);
    gauge!("smartmeter_energy_injected_kwh", "tariff" => "night").set(c.injection_night_kwh);

    if let Some(gas) = &reading.gas {
        gauge!("smartmeter_gas_total_m3").set(gas.total_m3);
    }
}

/// Record the current state of a load
pub fn record_load_state(load: &str, state: PowerState) {
    gauge!("smartmeter_load_state", "load" => load.to_string()).set(f64::from(state.as_bit()));
}

/// Meter statistics aggregator
///
/// Aggregates readings in memory for the end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct MeterStatsAggregator {
    pub total_readings: u64,
    /// Readings with net injection
    pub surplus_readings: u64,
    pub net_power: RunningStats,
    pub first: Option<CounterSample>,
    pub last: Option<CounterSample>,
    pub tariff_counts: BTreeMap<String, u64>,
    pub gas_readings: u64,
}

/// Energy registers at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    pub timestamp: DateTime<FixedOffset>,
    pub consumed_kwh: f64,
    pub injected_kwh: f64,
}

impl From<&Reading> for CounterSample {
    fn from(reading: &Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            consumed_kwh: reading.counters.total_consumption_kwh(),
            injected_kwh: reading.counters.total_injection_kwh(),
        }
    }
}

impl MeterStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, reading: &Reading) {
        self.total_readings += 1;
        if reading.power_w < 0.0 {
            self.surplus_readings += 1;
        }
        self.net_power.push(reading.power_w);

        let sample = CounterSample::from(reading);
        if self.first.is_none() {
            self.first = Some(sample);
        }
        self.last = Some(sample);

        let tariff = reading.tariff.map(|t| t.as_str()).unwrap_or("unknown");
        *self.tariff_counts.entry(tariff.to_string()).or_insert(0) += 1;

        if reading.gas.is_some() {
            self.gas_readings += 1;
        }
    }

    pub fn summary(&self) -> MeterSummary {
        let (consumed_kwh, injected_kwh, span_secs) = match (&self.first, &self.last) {
            (Some(first), Some(last)) => (
                (last.consumed_kwh - first.consumed_kwh).max(0.0),
                (last.injected_kwh - first.injected_kwh).max(0.0),
                (last.timestamp - first.timestamp).num_seconds().max(0),
            ),
            _ => (0.0, 0.0, 0),
        };

        MeterSummary {
            total_readings: self.total_readings,
            surplus_rate: if self.total_readings > 0 {
                self.surplus_readings as f64 / self.total_readings as f64 * 100.0
            } else {
                0.0
            },
            net_power_w: StatsSummary::from(&self.net_power),
            consumed_kwh,
            injected_kwh,
            span_secs,
            tariff_counts: self.tariff_counts.clone(),
            loads: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct MeterSummary {
    pub total_readings: u64,
    /// Share of readings with net injection, in percent
    pub surplus_rate: f64,
    pub net_power_w: StatsSummary,
    /// Register deltas between the first and last reading
    pub consumed_kwh: f64,
    pub injected_kwh: f64,
    pub span_secs: i64,
    pub tariff_counts: BTreeMap<String, u64>,
    pub loads: Vec<LoadSnapshot>,
}

impl MeterSummary {
    pub fn with_loads(mut self, loads: Vec<LoadSnapshot>) -> Self {
        self.loads = loads;
        self
    }
}

impl fmt::Display for MeterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Meter Summary ===")?;
        writeln!(f, "Readings: {} over {} s", self.total_readings, self.span_secs)?;
        writeln!(f, "Surplus readings: {:.2}%", self.surplus_rate)?;
        writeln!(f, "Net power (W): {}", self.net_power_w)?;
        writeln!(f, "Consumed: {:.3} kWh", self.consumed_kwh)?;
        writeln!(f, "Injected: {:.3} kWh", self.injected_kwh)?;

        if !self.tariff_counts.is_empty() {
            writeln!(f, "Tariffs:")?;
            for (tariff, count) in &self.tariff_counts {
                writeln!(f, "  {tariff}: {count}")?;
            }
        }

        if !self.loads.is_empty() {
            writeln!(f, "Loads:")?;
            for load in &self.loads {
                writeln!(
                    f,
                    "  {}: {} ({} commands, {} failures)",
                    load.name, load.state, load.commands, load.command_failures
                )?;
            }
        }

        Ok(())
    }
}

/// Summary of a `RunningStats`
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Tariff;

    fn reading(second: u32, power_w: f64, consumed: f64, injected: f64) -> Reading {
        let ts = DateTime::parse_from_rfc3339(&format!("2024-06-01T12:00:{second:02}+02:00")).unwrap();
        let mut r = Reading::new(ts, power_w);
        r.counters.consumption_day_kwh = consumed;
        r.counters.injection_day_kwh = injected;
        r.tariff = Some(Tariff::Day);
        r
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = MeterStatsAggregator::new();
        aggregator.update(&reading(0, 500.0, 10.0, 4.0));
        aggregator.update(&reading(10, -1500.0, 10.0, 4.5));
        aggregator.update(&reading(20, -500.0, 10.25, 5.0));

        let summary = aggregator.summary();
        assert_eq!(summary.total_readings, 3);
        assert!((summary.surplus_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!((summary.consumed_kwh - 0.25).abs() < 1e-9);
        assert!((summary.injected_kwh - 1.0).abs() < 1e-9);
        assert_eq!(summary.span_secs, 20);
        assert_eq!(summary.tariff_counts.get("day"), Some(&3));
        assert!((summary.net_power_w.mean + 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let summary = MeterStatsAggregator::new().summary();
        assert_eq!(summary.total_readings, 0);
        assert_eq!(summary.surplus_rate, 0.0);
        assert_eq!(format!("{}", summary.net_power_w), "N/A");
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = MeterStatsAggregator::new();
        aggregator.update(&reading(0, -800.0, 1.0, 2.0));
        let mut aux = LoadSnapshot::new("aux");
        aux.state = PowerState::On;
        aux.commands = 1;

        let output = format!("{}", aggregator.summary().with_loads(vec![aux]));
        assert!(output.contains("Readings: 1 over 0 s"));
        assert!(output.contains("Surplus readings: 100.00%"));
        assert!(output.contains("aux: ON (1 commands, 0 failures)"));
    }
}
