//! Error types for the FlowGate server.

use flowgate_admission::ConfigError;
use thiserror::Error;

/// Errors produced by the FlowGate server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Admission limits failed validation.
    #[error("invalid admission config: {0}")]
    Admission(#[from] ConfigError),

    /// A TOML config file could not be parsed.
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A JSON config file could not be parsed.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The config file has an extension we do not read.
    #[error("unsupported config file extension: {extension:?}")]
    UnsupportedConfig {
        /// Extension found on the path, possibly empty.
        extension: String,
    },

    /// Socket or file I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
