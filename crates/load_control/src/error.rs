//! Load control error types

use contracts::ContractError;
use thiserror::Error;

/// Load control error
#[derive(Debug, Error)]
pub enum ControlError {
    /// Actuator could not be prepared at startup
    #[error("load '{load}' actuator setup failed: {source}")]
    ActuatorSetup {
        load: String,
        #[source]
        source: ContractError,
    },

    /// Load section rejected while building the manager
    #[error("load '{load}' configuration error: {message}")]
    Config { load: String, message: String },
}

/// Load control Result type alias
pub type Result<T> = std::result::Result<T, ControlError>;
