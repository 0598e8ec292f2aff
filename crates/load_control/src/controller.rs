//! Hysteresis controller with hold timer.
//!
//! The controller never sleeps and never talks to hardware. Each evaluation
//! gets the current monotonic time and returns the command to issue, if any.
//! The caller reports a successful command back through [`LoadController::commit`];
//! until then the state and the pending transition stay untouched, so a
//! failed command is retried on the next evaluation.

use std::time::{Duration, Instant};

use contracts::{LoadConfig, PowerState, Reading};
use tracing::{debug, instrument};

/// A desired change that has not been committed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub target: PowerState,
    pub since: Instant,
}

/// Mutable controller state, owned by exactly one controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadState {
    pub current: PowerState,
    pub pending: Option<PendingTransition>,
}

/// Switching thresholds of one load
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Rated power (W)
    pub max_power: f64,
    /// Percent of max_power at or above which the load should be on
    pub switch_on: f64,
    /// Percent of max_power at or below which the load should be off
    pub switch_off: f64,
    pub hold: Duration,
}

impl From<&LoadConfig> for Thresholds {
    fn from(config: &LoadConfig) -> Self {
        Self {
            max_power: f64::from(config.max_power),
            switch_on: f64::from(config.switch_on),
            switch_off: f64::from(config.switch_off),
            hold: config.hold_duration(),
        }
    }
}

/// Per-load hysteresis state machine
#[derive(Debug, Clone)]
pub struct LoadController {
    name: String,
    thresholds: Thresholds,
    state: LoadState,
    enabled: bool,
}

impl LoadController {
    pub fn new(name: impl Into<String>, config: &LoadConfig) -> Self {
        Self::with_thresholds(name, Thresholds::from(config))
    }

    pub fn with_thresholds(name: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            name: name.into(),
            thresholds,
            state: LoadState::default(),
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop or resume evaluation. Disabling never switches the load.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.state.pending = None;
        }
        self.enabled = enabled;
    }

    /// Surplus available to this load, in Watt
    ///
    /// While the load is on its own draw is part of the measured import, so
    /// its rated power is added back.
    pub fn surplus_w(&self, reading: &Reading) -> f64 {
        let own_draw = if self.state.current.is_on() {
            self.thresholds.max_power
        } else {
            0.0
        };
        reading.surplus_w() + own_draw
    }

    /// Surplus as a percentage of the rated power
    pub fn surplus_pct(&self, reading: &Reading) -> f64 {
        if self.thresholds.max_power <= 0.0 {
            return 0.0;
        }
        self.surplus_w(reading) / self.thresholds.max_power * 100.0
    }

    /// Target implied by `surplus_pct`, `None` inside the dead band
    ///
    /// With equal thresholds the crossing value itself maps to on.
    pub fn desired(&self, surplus_pct: f64) -> Option<PowerState> {
        if surplus_pct >= self.thresholds.switch_on {
            Some(PowerState::On)
        } else if surplus_pct <= self.thresholds.switch_off {
            Some(PowerState::Off)
        } else {
            None
        }
    }

    /// Evaluate one surplus sample
    ///
    /// Returns the command to issue now. State only changes through
    /// [`commit`](Self::commit).
    #[instrument(
        level = "trace",
        name = "load_evaluate",
        skip(self, now),
        fields(load = %self.name, current = %self.state.current)
    )]
    pub fn evaluate(&mut self, surplus_pct: f64, now: Instant) -> Option<PowerState> {
        if !self.enabled {
            return None;
        }

        let desired = self.desired(surplus_pct)?;

        if desired == self.state.current {
            if self.state.pending.take().is_some() {
                debug!(load = %self.name, surplus_pct, "pending transition cancelled");
            }
            return None;
        }

        let pending = match self.state.pending {
            Some(pending) if pending.target == desired => pending,
            _ => {
                debug!(load = %self.name, target = %desired, surplus_pct, "pending transition started");
                let pending = PendingTransition {
                    target: desired,
                    since: now,
                };
                self.state.pending = Some(pending);
                pending
            }
        };

        if now.saturating_duration_since(pending.since) >= self.thresholds.hold {
            Some(desired)
        } else {
            None
        }
    }

    /// Evaluate a reading directly
    pub fn evaluate_reading(&mut self, reading: &Reading, now: Instant) -> Option<PowerState> {
        let pct = self.surplus_pct(reading);
        self.evaluate(pct, now)
    }

    /// Record that the actuator applied `target`
    pub fn commit(&mut self, target: PowerState) {
        self.state.current = target;
        self.state.pending = None;
    }
}
