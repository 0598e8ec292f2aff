//! LoadActuator trait - output of the load controller

use crate::{ContractError, PowerState};

/// Switches one physical load
#[trait_variant::make(LoadActuator: Send)]
pub trait LocalLoadActuator {
    /// Description of the switched device (pin, address)
    fn target(&self) -> String;

    /// Drive the load to `state`
    ///
    /// # Errors
    /// `ContractError::Actuator` when the command could not be applied.
    async fn switch(&mut self, state: PowerState) -> Result<(), ContractError>;
}
