//! Module descriptor
//!
//! A [`Module`] is the immutable shape of one loaded module: its parameters,
//! operations and the objects backing them. It is built once by a loader and
//! then owned by a dynamic module.

use crate::catalog::TypeResolver;
use crate::error::{Result, RuntimeError};
use capsule_api::{
    Capability, CapabilitySet, Converter, DataType, ModuleObject, SharedCapability,
    SharedConnectionManager, SharedProcessor, SharedSource, Value,
};
use semver::Version;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Configurable parameter of a module or an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,

    /// Declared type
    pub data_type: DataType,

    /// Marked optional
    pub optional: bool,

    /// Untyped default, coerced to the declared type when used
    pub default: Option<String>,
}

impl Parameter {
    /// Create a parameter
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        optional: bool,
        default: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            optional,
            default,
        }
    }

    /// Whether callers must supply a value
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// Request/response operation
#[derive(Debug, Clone)]
pub struct Processor {
    name: String,
    handle: SharedProcessor,
    handle_type: String,
    parameters: Vec<Parameter>,
    intercepting: bool,
}

impl Processor {
    /// Create a processor
    pub fn new(
        name: impl Into<String>,
        handle: SharedProcessor,
        handle_type: impl Into<String>,
        parameters: Vec<Parameter>,
        intercepting: bool,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            handle_type: handle_type.into(),
            parameters,
            intercepting,
        }
    }

    /// Operation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generated handle
    pub fn handle(&self) -> &SharedProcessor {
        &self.handle
    }

    /// Concrete type of the handle
    pub fn handle_type(&self) -> &str {
        &self.handle_type
    }

    /// Operation parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Whether the processor intercepts the flow
    pub fn is_intercepting(&self) -> bool {
        self.intercepting
    }
}

/// Event-producing operation
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    handle: SharedSource,
    handle_type: String,
    parameters: Vec<Parameter>,
}

impl Source {
    /// Create a source
    pub fn new(
        name: impl Into<String>,
        handle: SharedSource,
        handle_type: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            handle_type: handle_type.into(),
            parameters,
        }
    }

    /// Operation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generated handle
    pub fn handle(&self) -> &SharedSource {
        &self.handle
    }

    /// Concrete type of the handle
    pub fn handle_type(&self) -> &str {
        &self.handle_type
    }

    /// Operation parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }
}

/// Type converter contributed by the module
#[derive(Debug, Clone)]
pub struct Transformer {
    converter: Arc<dyn Converter>,
    priority_weighting: i32,
    source_types: Vec<DataType>,
}

impl Transformer {
    /// Create a transformer
    pub fn new(
        converter: Arc<dyn Converter>,
        priority_weighting: i32,
        source_types: Vec<DataType>,
    ) -> Self {
        Self {
            converter,
            priority_weighting,
            source_types,
        }
    }

    /// Generated converter
    pub fn converter(&self) -> &Arc<dyn Converter> {
        &self.converter
    }

    /// Lookup priority
    pub fn priority_weighting(&self) -> i32 {
        self.priority_weighting
    }

    /// Accepted source types
    pub fn source_types(&self) -> &[DataType] {
        &self.source_types
    }

    /// Converter to register, accepting the declared source types
    ///
    /// Without declared source types the generated converter is used as is.
    pub fn as_converter(&self) -> Arc<dyn Converter> {
        if self.source_types.is_empty() {
            return self.converter.clone();
        }
        Arc::new(DeclaredSources {
            inner: self.converter.clone(),
            source_types: self.source_types.clone(),
        })
    }
}

#[derive(Debug)]
struct DeclaredSources {
    inner: Arc<dyn Converter>,
    source_types: Vec<DataType>,
}

impl Converter for DeclaredSources {
    fn source_types(&self) -> &[DataType] {
        &self.source_types
    }

    fn return_type(&self) -> &DataType {
        self.inner.return_type()
    }

    fn convert(&self, value: &Value) -> capsule_api::Result<Value> {
        self.inner.convert(value)
    }
}

/// Loaded module
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    min_host_version: Option<String>,
    capability: SharedCapability,
    capabilities: CapabilitySet,
    parameters: Vec<Parameter>,
    processors: Vec<Processor>,
    sources: Vec<Source>,
    transformers: Vec<Transformer>,
    connection_manager: Option<SharedConnectionManager>,
    resolver: Arc<dyn TypeResolver>,
}

impl Module {
    /// Start building a module around `capability`
    pub fn builder(
        name: impl Into<String>,
        capability: SharedCapability,
        capabilities: CapabilitySet,
        resolver: Arc<dyn TypeResolver>,
    ) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            min_host_version: None,
            capability,
            capabilities,
            parameters: Vec::new(),
            processors: Vec::new(),
            sources: Vec::new(),
            transformers: Vec::new(),
            connection_manager: None,
            resolver,
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum host version
    pub fn min_host_version(&self) -> Option<&str> {
        self.min_host_version.as_deref()
    }

    /// Capability object
    pub fn capability(&self) -> &SharedCapability {
        &self.capability
    }

    /// Declared capabilities
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Module parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Processors
    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    /// Sources
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Transformers
    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    /// Connection manager
    pub fn connection_manager(&self) -> Option<&SharedConnectionManager> {
        self.connection_manager.as_ref()
    }

    /// Type resolution context the module was loaded from
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Find a processor by name
    pub fn find_processor(&self, name: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.name == name)
    }

    /// Find a source by name
    pub fn find_source(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Find a parameter by name
    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Object receiving the module configuration
    ///
    /// The connection manager when there is one, the capability otherwise.
    pub fn module_object(&self) -> ModuleObject {
        match &self.connection_manager {
            Some(manager) => ModuleObject::ConnectionManager(manager.clone()),
            None => ModuleObject::Capability(self.capability.clone()),
        }
    }

    /// Set the connection username
    pub async fn set_username(&self, username: &str) -> Result<()> {
        self.set_credential("username", username).await
    }

    /// Set the connection password
    pub async fn set_password(&self, password: &str) -> Result<()> {
        self.set_credential("password", password).await
    }

    /// Set the connection security token
    pub async fn set_security_token(&self, token: &str) -> Result<()> {
        self.set_credential("securityToken", token).await
    }

    async fn set_credential(&self, property: &str, value: &str) -> Result<()> {
        let manager = match &self.connection_manager {
            Some(manager) if self.capabilities.contains(Capability::ConnectionManagement) => {
                manager
            }
            _ => {
                return Err(RuntimeError::invalid_state(format!(
                    "Module <{}> is not connection management capable",
                    self.name
                )))
            }
        };

        ModuleObject::ConnectionManager(manager.clone())
            .set(property, &Value::from(value))
            .await?;
        debug!(module = %self.name, property, "Credential set");
        Ok(())
    }

    /// Whether the module runs on host version `host_version`
    ///
    /// Missing minor or patch components count as zero.
    pub fn is_compatible_with(&self, host_version: &str) -> Result<bool> {
        let Some(min) = &self.min_host_version else {
            return Ok(true);
        };
        Ok(parse_version(host_version)? >= parse_version(min)?)
    }
}

fn parse_version(version: &str) -> Result<Version> {
    let trimmed = version.trim();
    let padded = match trimmed.split('.').count() {
        1 => format!("{}.0.0", trimmed),
        2 => format!("{}.0", trimmed),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded)
        .map_err(|e| RuntimeError::conversion(format!("<{}> is not a valid version: {}", version, e)))
}

/// Builder for [`Module`]
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    min_host_version: Option<String>,
    capability: SharedCapability,
    capabilities: CapabilitySet,
    parameters: Vec<Parameter>,
    processors: Vec<Processor>,
    sources: Vec<Source>,
    transformers: Vec<Transformer>,
    connection_manager: Option<SharedConnectionManager>,
    resolver: Arc<dyn TypeResolver>,
}

impl ModuleBuilder {
    /// Set the minimum host version
    pub fn min_host_version(mut self, version: Option<String>) -> Self {
        self.min_host_version = version;
        self
    }

    /// Add module parameters
    pub fn parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Add a processor
    pub fn processor(mut self, processor: Processor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Add a source
    pub fn source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a transformer
    pub fn transformer(mut self, transformer: Transformer) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Set the connection manager
    pub fn connection_manager(mut self, manager: Option<SharedConnectionManager>) -> Self {
        self.connection_manager = manager;
        self
    }

    /// Validate and finish the module
    pub fn build(self) -> Result<Module> {
        ensure_unique("parameter", self.parameters.iter().map(|p| p.name.as_str()))?;
        ensure_unique("processor", self.processors.iter().map(|p| p.name.as_str()))?;
        ensure_unique("source", self.sources.iter().map(|s| s.name.as_str()))?;

        if self.connection_manager.is_some()
            && !self.capabilities.contains(Capability::ConnectionManagement)
        {
            return Err(RuntimeError::load(format!(
                "Module <{}> has a connection manager but is not connection management capable",
                self.name
            )));
        }

        Ok(Module {
            name: self.name,
            min_host_version: self.min_host_version,
            capability: self.capability,
            capabilities: self.capabilities,
            parameters: self.parameters,
            processors: self.processors,
            sources: self.sources,
            transformers: self.transformers,
            connection_manager: self.connection_manager,
            resolver: self.resolver,
        })
    }
}

fn ensure_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(RuntimeError::load(format!("Duplicate {} <{}>", kind, name)));
        }
    }
    Ok(())
}
