//! Reading - decoded meter telegram
//!
//! One `Reading` is produced per telegram and never mutated afterwards.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Active tariff reported by the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tariff {
    Day,
    Night,
}

impl Tariff {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Night => "night",
        }
    }
}

/// Cumulative energy registers (kWh)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCounters {
    pub consumption_day_kwh: f64,
    pub consumption_night_kwh: f64,
    pub injection_day_kwh: f64,
    pub injection_night_kwh: f64,
}

impl EnergyCounters {
    pub fn total_consumption_kwh(&self) -> f64 {
        self.consumption_day_kwh + self.consumption_night_kwh
    }

    pub fn total_injection_kwh(&self) -> f64 {
        self.injection_day_kwh + self.injection_night_kwh
    }
}

/// Instantaneous values of one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseReading {
    #[serde(default)]
    pub consumption_w: f64,
    #[serde(default)]
    pub injection_w: f64,
    #[serde(default)]
    pub voltage_v: Option<f64>,
    #[serde(default)]
    pub current_a: Option<f64>,
}

/// Gas meter value relayed by the electricity meter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasReading {
    pub timestamp: DateTime<FixedOffset>,
    pub total_m3: f64,
}

/// One decoded telegram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Meter timestamp
    pub timestamp: DateTime<FixedOffset>,

    /// Net power in Watt: positive = import from the grid, negative = export
    pub power_w: f64,

    /// Cumulative energy registers
    #[serde(default)]
    pub counters: EnergyCounters,

    /// Active tariff
    #[serde(default)]
    pub tariff: Option<Tariff>,

    /// Per-phase values (L1..L3)
    #[serde(default)]
    pub phases: Vec<PhaseReading>,

    /// Gas register
    #[serde(default)]
    pub gas: Option<GasReading>,
}

impl Reading {
    /// Create a reading with only a timestamp and a net power value
    pub fn new(timestamp: DateTime<FixedOffset>, power_w: f64) -> Self {
        Self {
            timestamp,
            power_w,
            counters: EnergyCounters::default(),
            tariff: None,
            phases: Vec::new(),
            gas: None,
        }
    }

    /// Exportable surplus in Watt (positive when exporting)
    pub fn surplus_w(&self) -> f64 {
        -self.power_w
    }

    /// Power imported from the grid (never negative)
    pub fn consumption_w(&self) -> f64 {
        self.power_w.max(0.0)
    }

    /// Power exported to the grid (never negative)
    pub fn injection_w(&self) -> f64 {
        (-self.power_w).max(0.0)
    }

    /// Phase `index` (0-based) if reported
    pub fn phase(&self, index: usize) -> Option<&PhaseReading> {
        self.phases.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00+02:00").unwrap()
    }

    #[test]
    fn test_import_and_export_split() {
        let importing = Reading::new(ts(), 420.0);
        assert_eq!(importing.consumption_w(), 420.0);
        assert_eq!(importing.injection_w(), 0.0);
        assert_eq!(importing.surplus_w(), -420.0);

        let exporting = Reading::new(ts(), -1800.0);
        assert_eq!(exporting.consumption_w(), 0.0);
        assert_eq!(exporting.injection_w(), 1800.0);
        assert_eq!(exporting.surplus_w(), 1800.0);
    }

    #[test]
    fn test_deserialize_minimal_json_line() {
        let line = r#"{"timestamp":"2024-06-01T12:00:00+02:00","power_w":-250.5}"#;
        let reading: Reading = serde_json::from_str(line).unwrap();
        assert_eq!(reading.power_w, -250.5);
        assert!(reading.phases.is_empty());
        assert!(reading.gas.is_none());
        assert_eq!(reading.timestamp.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_deserialize_full_json_line() {
        let line = r#"{
            "timestamp":"2024-01-10T08:15:00+01:00",
            "power_w":1200.0,
            "counters":{"consumption_day_kwh":1520.3,"consumption_night_kwh":980.1,
                        "injection_day_kwh":410.0,"injection_night_kwh":12.5},
            "tariff":"night",
            "phases":[{"consumption_w":1200.0,"voltage_v":231.2,"current_a":5.2}],
            "gas":{"timestamp":"2024-01-10T08:10:00+01:00","total_m3":3012.44}
        }"#;
        let reading: Reading = serde_json::from_str(line).unwrap();
        assert_eq!(reading.tariff, Some(Tariff::Night));
        assert!((reading.counters.total_consumption_kwh() - 2500.4).abs() < 1e-9);
        assert_eq!(reading.phase(0).and_then(|p| p.voltage_v), Some(231.2));
        assert!(reading.phase(1).is_none());
        assert_eq!(reading.gas.map(|g| g.total_m3), Some(3012.44));
    }
}
