//! Load state types shared between the controller and status consumers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actuator state of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    /// 1 when on, 0 when off
    pub fn as_bit(&self) -> u8 {
        match self {
            Self::On => 1,
            Self::Off => 0,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// Read-only view of one load, published after every evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Load name (section key)
    pub name: String,

    /// Current actuator state
    pub state: PowerState,

    /// Target of the pending transition, if any
    pub pending: Option<PowerState>,

    /// Last surplus percentage evaluated
    pub surplus_pct: Option<f64>,

    /// Successful actuator commands
    pub commands: u64,

    /// Failed actuator commands
    pub command_failures: u64,
}

impl LoadSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
