//! Type descriptors emitted by the code generator
//!
//! A descriptor is the static shape of one type: its parent, module
//! annotation, declared fields and operations, and a factory producing fresh
//! instances. The host never sees concrete module types, only descriptors and
//! the trait objects their factories return.

use crate::capability::{Capabilities, ConnectionManager};
use crate::converter::{Converter, DEFAULT_PRIORITY_WEIGHTING};
use crate::handle::{ProcessorHandle, SourceHandle};
use crate::value::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of module annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Plain module
    Module,
    /// Connector to an external system
    Connector,
}

/// Module metadata attached to a capability type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAnnotation {
    /// Annotation kind
    pub kind: ModuleKind,

    /// Module name
    pub name: String,

    /// Minimum host version the module runs on
    pub min_host_version: Option<String>,
}

/// Declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,

    /// Declared type
    pub data_type: DataType,

    /// Marked as a configurable module parameter
    pub configurable: bool,

    /// Marked optional
    pub optional: bool,

    /// Untyped default value
    pub default: Option<String>,
}

impl FieldDescriptor {
    /// Plain (non configurable) field
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            configurable: false,
            optional: false,
            default: None,
        }
    }

    /// Configurable field
    pub fn configurable(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            configurable: true,
            ..Self::new(name, data_type)
        }
    }

    /// Mark optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the default value
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Operation marker metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationMarker {
    /// Request/response operation
    Processor {
        /// Explicit operation name
        name: Option<String>,
        /// Whether the processor intercepts the flow
        intercepting: bool,
    },

    /// Event-producing operation
    Source {
        /// Explicit operation name
        name: Option<String>,
    },

    /// Type converter
    Transformer {
        /// Lookup priority
        priority_weighting: i32,
        /// Accepted source types
        source_types: Vec<DataType>,
    },
}

/// Declared operation argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    /// Declared type
    pub data_type: DataType,

    /// Marked optional
    pub optional: bool,

    /// Untyped default value
    pub default: Option<String>,
}

impl ArgumentDescriptor {
    /// Required argument
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            optional: false,
            default: None,
        }
    }

    /// Event-callback argument of source operations
    pub fn callback() -> Self {
        Self::new(DataType::SourceCallback)
    }

    /// Mark optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the default value
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Declared operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Method name
    pub method: String,

    /// Marker, absent for plain methods
    pub marker: Option<OperationMarker>,

    /// Arguments in declaration order
    pub arguments: Vec<ArgumentDescriptor>,
}

impl OperationDescriptor {
    /// Unmarked method
    pub fn plain(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            marker: None,
            arguments: Vec::new(),
        }
    }

    /// Processor operation
    pub fn processor(method: impl Into<String>) -> Self {
        Self {
            marker: Some(OperationMarker::Processor {
                name: None,
                intercepting: false,
            }),
            ..Self::plain(method)
        }
    }

    /// Source operation
    pub fn source(method: impl Into<String>) -> Self {
        Self {
            marker: Some(OperationMarker::Source { name: None }),
            ..Self::plain(method)
        }
    }

    /// Transformer operation with the default priority weighting
    pub fn transformer(method: impl Into<String>, source_types: Vec<DataType>) -> Self {
        Self {
            marker: Some(OperationMarker::Transformer {
                priority_weighting: DEFAULT_PRIORITY_WEIGHTING,
                source_types,
            }),
            ..Self::plain(method)
        }
    }

    /// Give the processor or source an explicit name
    pub fn named(mut self, operation_name: impl Into<String>) -> Self {
        match &mut self.marker {
            Some(OperationMarker::Processor { name, .. }) | Some(OperationMarker::Source { name }) => {
                *name = Some(operation_name.into());
            }
            _ => {}
        }
        self
    }

    /// Mark the processor intercepting
    pub fn intercepting(mut self) -> Self {
        if let Some(OperationMarker::Processor { intercepting, .. }) = &mut self.marker {
            *intercepting = true;
        }
        self
    }

    /// Set the transformer priority weighting
    pub fn priority(mut self, weighting: i32) -> Self {
        if let Some(OperationMarker::Transformer {
            priority_weighting, ..
        }) = &mut self.marker
        {
            *priority_weighting = weighting;
        }
        self
    }

    /// Append an argument
    pub fn argument(mut self, argument: ArgumentDescriptor) -> Self {
        self.arguments.push(argument);
        self
    }
}

/// Produces capability objects
pub type CapabilityFactory = Arc<dyn Fn() -> Box<dyn Capabilities> + Send + Sync>;
/// Produces connection managers
pub type ConnectionManagerFactory = Arc<dyn Fn() -> Box<dyn ConnectionManager> + Send + Sync>;
/// Produces processor handles
pub type ProcessorFactory = Arc<dyn Fn() -> Box<dyn ProcessorHandle> + Send + Sync>;
/// Produces source handles
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn SourceHandle> + Send + Sync>;
/// Produces transformers
pub type TransformerFactory = Arc<dyn Fn() -> Arc<dyn Converter> + Send + Sync>;

/// Instance factory attached to a descriptor
#[derive(Clone)]
pub enum Factory {
    /// Capability object
    Capability(CapabilityFactory),
    /// Connection manager
    ConnectionManager(ConnectionManagerFactory),
    /// Processor adapter
    Processor(ProcessorFactory),
    /// Source adapter
    Source(SourceFactory),
    /// Transformer adapter
    Transformer(TransformerFactory),
}

impl Factory {
    /// Kind of instances this factory produces
    pub fn kind(&self) -> &'static str {
        match self {
            Factory::Capability(_) => "capability",
            Factory::ConnectionManager(_) => "connection manager",
            Factory::Processor(_) => "processor",
            Factory::Source(_) => "source",
            Factory::Transformer(_) => "transformer",
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory({})", self.kind())
    }
}

/// Static shape of one type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    parent: Option<String>,
    annotation: Option<ModuleAnnotation>,
    fields: Vec<FieldDescriptor>,
    operations: Vec<OperationDescriptor>,
    factory: Option<Factory>,
}

impl TypeDescriptor {
    /// Start describing the type with qualified name `name`
    pub fn builder(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(name)
    }

    /// Qualified name (`org.acme.EchoModule`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its scope (`EchoModule`)
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Declaring scope (`org.acme`), empty for unscoped types
    pub fn scope(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(scope, _)| scope)
    }

    /// Direct parent type name
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Module annotation declared on this type
    pub fn annotation(&self) -> Option<&ModuleAnnotation> {
        self.annotation.as_ref()
    }

    /// Fields declared on this type
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Operations declared on this type
    pub fn operations(&self) -> &[OperationDescriptor] {
        &self.operations
    }

    /// Instance factory
    pub fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }

    /// Create a capability object
    pub fn new_capability(&self) -> Option<Box<dyn Capabilities>> {
        match &self.factory {
            Some(Factory::Capability(f)) => Some(f()),
            _ => None,
        }
    }

    /// Create a connection manager
    pub fn new_connection_manager(&self) -> Option<Box<dyn ConnectionManager>> {
        match &self.factory {
            Some(Factory::ConnectionManager(f)) => Some(f()),
            _ => None,
        }
    }

    /// Create a processor adapter
    pub fn new_processor(&self) -> Option<Box<dyn ProcessorHandle>> {
        match &self.factory {
            Some(Factory::Processor(f)) => Some(f()),
            _ => None,
        }
    }

    /// Create a source adapter
    pub fn new_source(&self) -> Option<Box<dyn SourceHandle>> {
        match &self.factory {
            Some(Factory::Source(f)) => Some(f()),
            _ => None,
        }
    }

    /// Create a transformer adapter
    pub fn new_transformer(&self) -> Option<Arc<dyn Converter>> {
        match &self.factory {
            Some(Factory::Transformer(f)) => Some(f()),
            _ => None,
        }
    }
}

/// Builder for [`TypeDescriptor`]
#[derive(Debug)]
pub struct TypeDescriptorBuilder {
    name: String,
    parent: Option<String>,
    annotation: Option<(ModuleKind, String)>,
    min_host_version: Option<String>,
    fields: Vec<FieldDescriptor>,
    operations: Vec<OperationDescriptor>,
    factory: Option<Factory>,
}

impl TypeDescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            annotation: None,
            min_host_version: None,
            fields: Vec::new(),
            operations: Vec::new(),
            factory: None,
        }
    }

    /// Set the direct parent type
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Annotate as a module
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.annotation = Some((ModuleKind::Module, name.into()));
        self
    }

    /// Annotate as a connector
    pub fn connector(mut self, name: impl Into<String>) -> Self {
        self.annotation = Some((ModuleKind::Connector, name.into()));
        self
    }

    /// Set the minimum host version of the annotation
    pub fn min_host_version(mut self, version: impl Into<String>) -> Self {
        self.min_host_version = Some(version.into());
        self
    }

    /// Declare a field
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare an operation
    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    /// Attach a capability factory
    pub fn capability_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Capabilities> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Capability(Arc::new(factory)));
        self
    }

    /// Attach a connection manager factory
    pub fn connection_manager_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ConnectionManager> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::ConnectionManager(Arc::new(factory)));
        self
    }

    /// Attach a processor factory
    pub fn processor_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ProcessorHandle> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Processor(Arc::new(factory)));
        self
    }

    /// Attach a source factory
    pub fn source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SourceHandle> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Source(Arc::new(factory)));
        self
    }

    /// Attach a transformer factory
    pub fn transformer_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Converter> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Transformer(Arc::new(factory)));
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> TypeDescriptor {
        let min_host_version = self.min_host_version;
        TypeDescriptor {
            name: self.name,
            parent: self.parent,
            annotation: self.annotation.map(|(kind, name)| ModuleAnnotation {
                kind,
                name,
                min_host_version,
            }),
            fields: self.fields,
            operations: self.operations,
            factory: self.factory,
        }
    }
}
