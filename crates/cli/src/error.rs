//! Error types for CLI operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Neither `--replay` nor `--mock` was given
    #[error("No reading source: pass --replay <file> or --mock (the serial telegram decoder is not part of this build)")]
    NoSource,

    /// Invalid command line value
    #[error("Invalid argument {name}: {message}")]
    InvalidArgument { name: &'static str, message: String },

    /// Some files could not be uploaded; they stay for the next run
    #[error("{failed} file(s) could not be uploaded")]
    UploadIncomplete { failed: u64 },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.to_path_buf(),
        }
    }

    pub fn invalid_argument(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            message: message.into(),
        }
    }
}
