//! Capability objects and connection managers

use crate::bindable::Bindable;
use crate::binder::{self, ParameterMap};
use crate::error::BindingError;
use crate::lifecycle::Lifecycle;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Optional behaviours a capability object can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Responds to initialise/start/stop/dispose
    Lifecycle,

    /// Needs a companion connection manager
    ConnectionManagement,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Lifecycle => write!(f, "lifecycle"),
            Capability::ConnectionManagement => write!(f, "connection_management"),
        }
    }
}

/// The user-authored component a module wraps
pub trait Capabilities: Bindable + Lifecycle + fmt::Debug {
    /// Declarative capability query
    fn is_capable_of(&self, capability: Capability) -> bool;
}

/// Companion object owning connections on behalf of a capability
///
/// Credentials are plain properties (`username`, `password`,
/// `securityToken`) written through the binder.
pub trait ConnectionManager: Bindable + Lifecycle + fmt::Debug {}

/// Snapshot of a capability object's declared capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Lifecycle capable
    pub lifecycle: bool,

    /// Connection management capable
    pub connection_management: bool,
}

impl CapabilitySet {
    /// Query every capability of `object`
    pub fn of<T: Capabilities + ?Sized>(object: &T) -> Self {
        Self {
            lifecycle: object.is_capable_of(Capability::Lifecycle),
            connection_management: object.is_capable_of(Capability::ConnectionManagement),
        }
    }

    /// Add a capability
    pub fn with(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Lifecycle => self.lifecycle = true,
            Capability::ConnectionManagement => self.connection_management = true,
        }
        self
    }

    /// Check if a capability is present
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Lifecycle => self.lifecycle,
            Capability::ConnectionManagement => self.connection_management,
        }
    }
}

/// Capability object shared between the module descriptor and the host
pub type SharedCapability = Arc<Mutex<Box<dyn Capabilities>>>;

/// Connection manager shared between the module descriptor and the host
pub type SharedConnectionManager = Arc<Mutex<Box<dyn ConnectionManager>>>;

/// Object carrying a module's configuration
///
/// This is the connection manager when the module has one, the capability
/// object otherwise. Generated handles look it up in the execution context
/// registry to read configured properties.
#[derive(Debug, Clone)]
pub enum ModuleObject {
    /// The capability object itself
    Capability(SharedCapability),

    /// The capability's connection manager
    ConnectionManager(SharedConnectionManager),
}

impl ModuleObject {
    /// Read a property
    pub async fn get(&self, property: &str) -> Result<Value, BindingError> {
        match self {
            ModuleObject::Capability(c) => binder::get(&**c.lock().await, property),
            ModuleObject::ConnectionManager(m) => binder::get(&**m.lock().await, property),
        }
    }

    /// Write a property
    pub async fn set(&self, property: &str, value: &Value) -> Result<(), BindingError> {
        match self {
            ModuleObject::Capability(c) => binder::set(&mut **c.lock().await, property, value),
            ModuleObject::ConnectionManager(m) => {
                binder::set(&mut **m.lock().await, property, value)
            }
        }
    }

    /// Write every property of `parameters`, stopping at the first failure
    pub async fn set_all(&self, parameters: &ParameterMap) -> Result<(), BindingError> {
        match self {
            ModuleObject::Capability(c) => binder::set_all(&mut **c.lock().await, parameters),
            ModuleObject::ConnectionManager(m) => {
                binder::set_all(&mut **m.lock().await, parameters)
            }
        }
    }

    /// Type name of the underlying object
    pub async fn type_name(&self) -> String {
        match self {
            ModuleObject::Capability(c) => c.lock().await.type_name().to_string(),
            ModuleObject::ConnectionManager(m) => m.lock().await.type_name().to_string(),
        }
    }
}
