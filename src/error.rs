//! Error types for Chrollo.

use std::time::Duration;

use thiserror::Error;

/// Common error type for Chrollo.
#[derive(Error, Debug)]
pub enum ChrolloError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Script execution error (syntax, runtime, or API misuse raised in Lua).
    #[error("script error: {0}")]
    Script(String),

    /// Script exceeded its wall-clock execution budget.
    #[error("script timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for host input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested protocol plugin is not registered.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Conversion between Lua values and host types failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChrolloError {
    fn from(e: serde_json::Error) -> Self {
        ChrolloError::Serialization(e.to_string())
    }
}

/// Result type alias for Chrollo operations.
pub type Result<T> = std::result::Result<T, ChrolloError>;
