//! Module error types

use std::fmt;

/// Error raised when a named property cannot be read or written on an object
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to {action} property <{property}> on <{target}>: {reason}")]
pub struct BindingError {
    /// Property name
    pub property: String,

    /// Type name of the object the property was resolved against
    pub target: String,

    /// `get` or `set`
    pub action: &'static str,

    /// Human readable cause
    pub reason: String,
}

impl BindingError {
    /// Create an error for a failed read
    pub fn get(
        property: impl Into<String>,
        target: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            property: property.into(),
            target: target.into(),
            action: "get",
            reason: reason.to_string(),
        }
    }

    /// Create an error for a failed write
    pub fn set(
        property: impl Into<String>,
        target: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            property: property.into(),
            target: target.into(),
            action: "set",
            reason: reason.to_string(),
        }
    }
}

/// Error type returned by capabilities, handles and converters
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Value conversion error
    #[error("Conversion error: {0}")]
    ConversionError(String),

    /// Property binding error
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for module operations
pub type Result<T> = std::result::Result<T, OperationError>;

impl OperationError {
    /// Create a new initialization error
    pub fn init(msg: impl fmt::Display) -> Self {
        Self::InitError(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::ConfigError(msg.to_string())
    }

    /// Create a new runtime error
    pub fn runtime(msg: impl fmt::Display) -> Self {
        Self::RuntimeError(msg.to_string())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl fmt::Display) -> Self {
        Self::InvalidState(msg.to_string())
    }

    /// Create a new conversion error
    pub fn conversion(msg: impl fmt::Display) -> Self {
        Self::ConversionError(msg.to_string())
    }
}
