//! Layered error definitions
//!
//! Categorized by source: config / source / sink / rotation / actuator

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Source Errors =====
    /// Reading source failed (disconnect, timeout, undecodable telegram)
    #[error("source '{source_name}' error: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    /// Output file could not be opened, renamed or removed
    #[error("rotation error for '{path}': {message}")]
    Rotation { path: String, message: String },

    // ===== Actuator Errors =====
    /// Load actuator command failed
    #[error("actuator for load '{load}' failed: {message}")]
    Actuator { load: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create source error
    pub fn source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create rotation error
    pub fn rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rotation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create actuator error
    pub fn actuator(load: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Actuator {
            load: load.into(),
            message: message.into(),
        }
    }

    /// Escalate a rotation failure to a write failure of the owning sink
    pub fn into_sink_error(self, sink_name: &str) -> Self {
        match self {
            Self::Rotation { path, message } => {
                Self::sink_write(sink_name, format!("rotation of '{path}' failed: {message}"))
            }
            Self::Io(e) => Self::sink_write(sink_name, e.to_string()),
            other => other,
        }
    }

    /// Whether this is a fatal startup error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigParse { .. } | Self::ConfigValidation { .. })
    }
}
