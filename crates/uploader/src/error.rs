//! Uploader error types

use thiserror::Error;

/// Uploader error
#[derive(Debug, Error)]
pub enum UploadError {
    /// Upload directory could not be read
    #[error("cannot list '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The store rejected or did not answer a put
    #[error("upload of '{key}' failed: {message}")]
    Store { key: String, message: String },

    /// Bucket handle could not be built
    #[error("object store setup failed: {0}")]
    Setup(String),

    /// Access key or secret key missing from the environment
    #[error("{0} is not set")]
    MissingCredential(&'static str),
}

impl UploadError {
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
