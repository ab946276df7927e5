//! Runtime error types

use capsule_api::{BindingError, OperationError};
use std::fmt;

/// One parameter whose value is not assignable to its declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeViolation {
    /// Parameter name
    pub parameter: String,

    /// Declared type
    pub expected: String,

    /// Runtime type of the supplied value
    pub actual: String,
}

impl fmt::Display for TypeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> expects {} but got {}",
            self.parameter, self.expected, self.actual
        )
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runtime error type
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Module shape could not be discovered
    #[error("Failed to load module: {0}")]
    Load(String),

    /// Supplied parameters of the wrong type
    #[error("Invalid parameter types: {}", join(.0))]
    ParameterType(Vec<TypeViolation>),

    /// Required parameters not supplied
    #[error("Missing required parameters: {}", join(.0))]
    MissingParameter(Vec<String>),

    /// Property binding failed
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Default value conversion failed
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Named operation does not exist
    #[error("{kind} <{name}> not found")]
    NotFound {
        /// Operation kind
        kind: &'static str,
        /// Operation name
        name: String,
    },

    /// Source already subscribed
    #[error("Source <{0}> is already subscribed")]
    Conflict(String),

    /// Source never subscribed
    #[error("Source <{0}> is not subscribed")]
    NotSubscribed(String),

    /// A lifecycle phase failed
    #[error("Failed to {phase} <{target}>: {source}")]
    Lifecycle {
        /// Phase name
        phase: String,
        /// Type name of the object
        target: String,
        /// Underlying failure
        #[source]
        source: OperationError,
    },

    /// Operation body failed
    #[error("Failed to invoke <{operation}>: {source}")]
    Invocation {
        /// Operation name
        operation: String,
        /// Underlying failure
        #[source]
        source: OperationError,
    },

    /// Some resources failed to release
    #[error("Failed to dispose: {}", join(.0))]
    Dispose(Vec<String>),

    /// Object used in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    /// Create a new load error
    pub fn load(msg: impl fmt::Display) -> Self {
        Self::Load(msg.to_string())
    }

    /// Create a new conversion error
    pub fn conversion(msg: impl fmt::Display) -> Self {
        Self::Conversion(msg.to_string())
    }

    /// Create a new processor not found error
    pub fn processor_not_found(name: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: "Processor",
            name: name.to_string(),
        }
    }

    /// Create a new source not found error
    pub fn source_not_found(name: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: "Source",
            name: name.to_string(),
        }
    }

    /// Create a new lifecycle error
    pub fn lifecycle(
        phase: impl fmt::Display,
        target: impl fmt::Display,
        source: OperationError,
    ) -> Self {
        Self::Lifecycle {
            phase: phase.to_string(),
            target: target.to_string(),
            source,
        }
    }

    /// Create a new invocation error
    pub fn invocation(operation: impl fmt::Display, source: OperationError) -> Self {
        Self::Invocation {
            operation: operation.to_string(),
            source,
        }
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl fmt::Display) -> Self {
        Self::InvalidState(msg.to_string())
    }

    /// Create a new config error
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }
}
