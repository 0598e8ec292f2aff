//! LoadManager - one worker per enabled `[loads.<name>]` section

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use contracts::{
    ApplianceConfig, Clock, LoadConfig, LoadSnapshot, Reading, SystemClock, AUX_LOAD_NAME,
    DEFAULT_AUX_GPIO_PIN,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::actuator::{Actuator, LogActuator, SysfsGpioActuator, DEFAULT_GPIO_ROOT};
use crate::controller::LoadController;
use crate::error::{ControlError, Result};
use crate::worker::LoadWorker;

/// How actuators are built
#[derive(Debug, Clone)]
pub struct ActuatorOptions {
    /// sysfs GPIO root
    pub gpio_root: PathBuf,
    /// Log commands instead of touching hardware
    pub dry_run: bool,
}

impl Default for ActuatorOptions {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            dry_run: false,
        }
    }
}

/// Collection of load workers keyed by load name
///
/// Built once from validated config. Disabled sections get no worker.
pub struct LoadManager {
    workers: Vec<LoadWorker<Actuator>>,
}

impl LoadManager {
    pub fn from_config(config: &ApplianceConfig, options: &ActuatorOptions) -> Result<Self> {
        Self::from_config_with_clock(config, options, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(
        config: &ApplianceConfig,
        options: &ActuatorOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut workers = Vec::new();

        for (name, load) in &config.loads {
            if !load.enabled {
                info!(load = %name, "load is not enabled");
                continue;
            }
            let actuator = select_actuator(name, load, options)?;
            info!(
                load = %name,
                max_power = load.max_power,
                switch_on = load.switch_on,
                switch_off = load.switch_off,
                hold_timer = load.hold_timer,
                "added load"
            );
            workers.push(LoadWorker::with_clock(
                LoadController::new(name.clone(), load),
                actuator,
                clock.clone(),
            ));
        }

        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name()).collect()
    }

    /// Export GPIO pins and drive every load off
    pub async fn prepare(&self) -> Result<()> {
        for worker in &self.workers {
            worker
                .actuator()
                .prepare()
                .await
                .map_err(|source| ControlError::ActuatorSetup {
                    load: worker.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Status receivers of all loads
    pub fn status(&self) -> LoadStatus {
        LoadStatus {
            receivers: self
                .workers
                .iter()
                .map(|w| (w.name().to_string(), w.subscribe()))
                .collect(),
        }
    }

    /// Spawn every worker on its own reading subscription
    pub fn spawn<F>(self, mut subscribe: F) -> LoadTasks
    where
        F: FnMut(&str) -> mpsc::Receiver<Arc<Reading>>,
    {
        let handles = self
            .workers
            .into_iter()
            .map(|worker| {
                let name = worker.name().to_string();
                let rx = subscribe(&name);
                (name, tokio::spawn(worker.run(rx)))
            })
            .collect();
        LoadTasks { handles }
    }
}

fn select_actuator(name: &str, load: &LoadConfig, options: &ActuatorOptions) -> Result<Actuator> {
    let is_aux = name == AUX_LOAD_NAME;
    let pin = load.gpio_pin.unwrap_or(DEFAULT_AUX_GPIO_PIN);

    if options.dry_run {
        let target = match (&load.address, is_aux) {
            (_, true) => format!("gpio{pin}"),
            (Some(address), false) => address.clone(),
            (None, false) => String::from("unaddressed"),
        };
        return Ok(Actuator::Log(LogActuator::new(name, target)));
    }

    if is_aux {
        return Ok(Actuator::Gpio(SysfsGpioActuator::new(
            name,
            pin,
            options.gpio_root.clone(),
        )));
    }

    match &load.address {
        Some(address) if !address.trim().is_empty() => {
            warn!(load = %name, %address, "remote switching not available, commands are logged only");
            Ok(Actuator::Log(LogActuator::new(name, address.clone())))
        }
        _ => Err(ControlError::Config {
            load: name.to_string(),
            message: "address is required for loads other than 'aux'".to_string(),
        }),
    }
}

/// Cloneable view of every load's latest snapshot
#[derive(Clone)]
pub struct LoadStatus {
    receivers: BTreeMap<String, watch::Receiver<LoadSnapshot>>,
}

impl LoadStatus {
    /// Latest snapshot per load, in name order
    pub fn snapshots(&self) -> Vec<LoadSnapshot> {
        self.receivers.values().map(|rx| rx.borrow().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<LoadSnapshot> {
        self.receivers.get(name).map(|rx| rx.borrow().clone())
    }
}

impl FromIterator<(String, watch::Receiver<LoadSnapshot>)> for LoadStatus {
    fn from_iter<I: IntoIterator<Item = (String, watch::Receiver<LoadSnapshot>)>>(iter: I) -> Self {
        Self {
            receivers: iter.into_iter().collect(),
        }
    }
}

/// Running load workers
pub struct LoadTasks {
    handles: Vec<(String, JoinHandle<LoadSnapshot>)>,
}

impl LoadTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker; they end when their reading stream closes
    pub async fn join(self) -> Vec<LoadSnapshot> {
        let mut snapshots = Vec::with_capacity(self.handles.len());
        for (name, handle) in self.handles {
            match handle.await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(load = %name, error = %e, "load worker task failed"),
            }
        }
        snapshots
    }
}
