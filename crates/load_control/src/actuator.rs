//! Load actuators
//!
//! - `SysfsGpioActuator`: relay on a GPIO line, driven through sysfs
//! - `LogActuator`: only logs; used for remote loads and dry runs

use std::path::{Path, PathBuf};

use contracts::{ContractError, LoadActuator, PowerState};
use tracing::{debug, info};

/// Default sysfs GPIO root
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Relay wired to a GPIO pin
#[derive(Debug, Clone)]
pub struct SysfsGpioActuator {
    load: String,
    pin: u32,
    root: PathBuf,
}

impl SysfsGpioActuator {
    pub fn new(load: impl Into<String>, pin: u32, root: impl Into<PathBuf>) -> Self {
        Self {
            load: load.into(),
            pin,
            root: root.into(),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn value_path(&self) -> PathBuf {
        self.pin_dir().join("value")
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), ContractError> {
        tokio::fs::write(path, content).await.map_err(|e| {
            ContractError::actuator(&self.load, format!("write {}: {e}", path.display()))
        })
    }

    /// Export the pin as an output and drive it low
    pub async fn prepare(&self) -> Result<(), ContractError> {
        let pin_dir = self.pin_dir();
        if !tokio::fs::try_exists(&pin_dir).await.unwrap_or(false) {
            debug!(load = %self.load, pin = self.pin, "exporting gpio pin");
            self.write(&self.root.join("export"), &self.pin.to_string())
                .await?;
        }
        self.write(&pin_dir.join("direction"), "out").await?;
        self.write(&self.value_path(), "0").await
    }
}

impl LoadActuator for SysfsGpioActuator {
    fn target(&self) -> String {
        format!("gpio{}", self.pin)
    }

    async fn switch(&mut self, state: PowerState) -> Result<(), ContractError> {
        let value = state.as_bit().to_string();
        self.write(&self.value_path(), &value).await?;
        debug!(load = %self.load, pin = self.pin, %state, "gpio written");
        Ok(())
    }
}

/// Actuator that only logs the command
#[derive(Debug, Clone)]
pub struct LogActuator {
    load: String,
    target: String,
}

impl LogActuator {
    pub fn new(load: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            load: load.into(),
            target: target.into(),
        }
    }
}

impl LoadActuator for LogActuator {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn switch(&mut self, state: PowerState) -> Result<(), ContractError> {
        info!(load = %self.load, target = %self.target, %state, "switch (log only)");
        Ok(())
    }
}

/// Actuator selected from the load configuration
#[derive(Debug, Clone)]
pub enum Actuator {
    Gpio(SysfsGpioActuator),
    Log(LogActuator),
}

impl Actuator {
    /// Prepare hardware, if any
    pub async fn prepare(&self) -> Result<(), ContractError> {
        match self {
            Self::Gpio(gpio) => gpio.prepare().await,
            Self::Log(_) => Ok(()),
        }
    }
}

impl LoadActuator for Actuator {
    fn target(&self) -> String {
        match self {
            Self::Gpio(gpio) => gpio.target(),
            Self::Log(log) => log.target(),
        }
    }

    async fn switch(&mut self, state: PowerState) -> Result<(), ContractError> {
        match self {
            Self::Gpio(gpio) => gpio.switch(state).await,
            Self::Log(log) => log.switch(state).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gpio_prepare_and_switch() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("gpio24")).unwrap();

        let mut gpio = SysfsGpioActuator::new("aux", 24, root.path());
        gpio.prepare().await.unwrap();
        let value = root.path().join("gpio24/value");
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "0");
        assert_eq!(
            std::fs::read_to_string(root.path().join("gpio24/direction")).unwrap(),
            "out"
        );

        gpio.switch(PowerState::On).await.unwrap();
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "1");
        gpio.switch(PowerState::Off).await.unwrap();
        assert_eq!(std::fs::read_to_string(&value).unwrap(), "0");
        assert_eq!(gpio.target(), "gpio24");
    }

    #[tokio::test]
    async fn test_gpio_missing_pin_is_actuator_error() {
        let root = tempfile::tempdir().unwrap();
        let mut gpio = SysfsGpioActuator::new("aux", 24, root.path());

        let err = gpio.switch(PowerState::On).await.unwrap_err();
        assert!(matches!(err, ContractError::Actuator { ref load, .. } if load == "aux"));
    }

    #[tokio::test]
    async fn test_log_actuator_always_succeeds() {
        let mut actuator = Actuator::Log(LogActuator::new("boiler", "10.0.0.7"));
        actuator.prepare().await.unwrap();
        actuator.switch(PowerState::On).await.unwrap();
        assert_eq!(actuator.target(), "10.0.0.7");
    }
}
