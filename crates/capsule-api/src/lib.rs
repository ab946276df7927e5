//! # Capsule Module API
//!
//! This crate provides the contracts shared by the Capsule host and the
//! modules it loads.
//!
//! ## Contracts
//!
//! - **Capabilities**: the user-authored component a module wraps
//! - **Connection managers**: companions owning connections for a capability
//! - **Processor / source handles**: generated adapters, one per operation
//! - **Converters**: typed value conversion, also used for module transformers
//! - **Bindable**: named property access used to configure all of the above
//! - **Type descriptors**: the static shape the code generator emits for every
//!   type, with a factory producing instances
//!
//! ## Example
//!
//! ```rust,no_run
//! use capsule_api::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Echo {
//!     greeting: String,
//! }
//!
//! impl Bindable for Echo {
//!     fn type_name(&self) -> &str { "org.acme.EchoModule" }
//!
//!     fn invoke_getter(&self, method: &str) -> Option<Value> {
//!         (method == "greeting").then(|| Value::from(self.greeting.clone()))
//!     }
//!
//!     fn invoke_setter(&mut self, method: &str, arg: &DataType, value: &Value) -> Option<Result<()>> {
//!         if method != "set_greeting" || *arg != DataType::String {
//!             return None;
//!         }
//!         self.greeting = value.as_str()?.to_string();
//!         Some(Ok(()))
//!     }
//! }
//!
//! #[async_trait]
//! impl Lifecycle for Echo {}
//!
//! impl Capabilities for Echo {
//!     fn is_capable_of(&self, capability: Capability) -> bool {
//!         capability == Capability::Lifecycle
//!     }
//! }
//!
//! let descriptor = TypeDescriptor::builder("org.acme.EchoModule")
//!     .module("echo")
//!     .field(FieldDescriptor::configurable("greeting", DataType::String).optional().default_value("hi"))
//!     .operation(OperationDescriptor::processor("echo"))
//!     .capability_factory(|| Box::new(Echo::default()))
//!     .build();
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod bindable;
pub mod binder;
pub mod capability;
pub mod context;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod value;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use bindable::{getter_name, setter_name, Bindable, FieldSet};
pub use binder::ParameterMap;
pub use capability::{
    Capabilities, Capability, CapabilitySet, ConnectionManager, ModuleObject, SharedCapability,
    SharedConnectionManager,
};
pub use context::{ExecutionContext, InvocationEvent, MODULE_OBJECT_KEY};
pub use converter::{
    default_converters, Converter, ConverterRegistry, StringConverter, DEFAULT_PRIORITY_WEIGHTING,
};
pub use descriptor::{
    ArgumentDescriptor, Factory, FieldDescriptor, ModuleAnnotation, ModuleKind,
    OperationDescriptor, OperationMarker, TypeDescriptor, TypeDescriptorBuilder,
};
pub use error::{BindingError, OperationError, Result};
pub use handle::{
    ContextAware, EventListener, ProcessorHandle, SharedProcessor, SharedSource, SourceHandle,
};
pub use lifecycle::{Lifecycle, LifecycleState, Phase};
pub use value::{DataType, OpaqueValue, Primitive, Value};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::bindable::{Bindable, FieldSet};
    pub use crate::binder::ParameterMap;
    pub use crate::capability::{Capabilities, Capability, ConnectionManager, ModuleObject};
    pub use crate::context::{ExecutionContext, InvocationEvent, MODULE_OBJECT_KEY};
    pub use crate::converter::Converter;
    pub use crate::descriptor::{
        ArgumentDescriptor, FieldDescriptor, OperationDescriptor, TypeDescriptor,
    };
    pub use crate::error::{OperationError, Result};
    pub use crate::handle::{ContextAware, EventListener, ProcessorHandle, SourceHandle};
    pub use crate::lifecycle::Lifecycle;
    pub use crate::value::{DataType, Value};
    pub use async_trait::async_trait;
}
