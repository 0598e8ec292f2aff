//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Replay file could not be opened
    #[error("cannot open replay file '{path}': {source}")]
    ReplayOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A source is already driving this pipeline
    #[error("pipeline already started with source '{source_name}'")]
    AlreadyStarted { source_name: String },

    /// Mock source needs at least one power value
    #[error("mock profile is empty")]
    EmptyProfile,

    /// Error reported by a reading source
    #[error(transparent)]
    Source(#[from] ContractError),
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
