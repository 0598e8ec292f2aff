//! # Load Control
//!
//! Switches controllable loads on exported surplus power.
//!
//! Responsibilities:
//! - Hysteresis between `switch_on` and `switch_off` with a hold timer
//! - One worker per enabled load, evaluating readings strictly in order
//! - Actuator failures retried on the next reading, never fatal
//! - Publish per-load snapshots for status consumers
//!
//! ## Usage Example
//!
//! ```ignore
//! use load_control::{ActuatorOptions, LoadManager};
//!
//! let manager = LoadManager::from_config(&config, &ActuatorOptions::default())?;
//! manager.prepare().await?;
//! let status = manager.status();
//! let tasks = manager.spawn(|name| dispatcher.subscribe(name, 64));
//! ```

mod actuator;
mod controller;
mod error;
mod manager;
mod worker;

// Re-exports
pub use actuator::{Actuator, LogActuator, SysfsGpioActuator, DEFAULT_GPIO_ROOT};
pub use controller::{LoadController, LoadState, PendingTransition, Thresholds};
pub use error::{ControlError, Result};
pub use manager::{ActuatorOptions, LoadManager, LoadStatus, LoadTasks};
pub use worker::LoadWorker;

pub use contracts::{LoadSnapshot, PowerState};
