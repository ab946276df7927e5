//! Module loading from capability objects
//!
//! [`Loader`] inspects a capability object through its type descriptor and
//! builds the matching [`Module`]. Every marked operation has a companion
//! adapter type emitted by the code generator in the capability's scope,
//! named `{Operation}MessageProcessor`, `{Operation}MessageSource` or
//! `{Operation}Transformer`.

use crate::catalog::TypeResolver;
use crate::error::{Result, RuntimeError};
use crate::module::{Module, Parameter, Processor, Source, Transformer};
use capsule_api::{
    Capabilities, CapabilitySet, ConnectionManager, DataType, OperationDescriptor,
    OperationMarker, TypeDescriptor,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MESSAGE_PROCESSOR_SUFFIX: &str = "MessageProcessor";
const MESSAGE_SOURCE_SUFFIX: &str = "MessageSource";
const TRANSFORMER_SUFFIX: &str = "Transformer";
const PARAMETER_TYPE_FIELD_PREFIX: &str = "_";
const PARAMETER_TYPE_FIELD_SUFFIX: &str = "Type";

/// Builds modules from capability objects
#[derive(Debug, Clone)]
pub struct Loader {
    resolver: Arc<dyn TypeResolver>,
}

impl Loader {
    /// Create a loader resolving types through `resolver`
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self { resolver }
    }

    /// Type resolution context
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }

    /// Build the module wrapping `capability`
    pub fn load(
        &self,
        capability: Box<dyn Capabilities>,
        connection_manager: Option<Box<dyn ConnectionManager>>,
    ) -> Result<Module> {
        let type_name = capability.type_name().to_string();
        let descriptor = self
            .resolver
            .resolve(&type_name)
            .ok_or_else(|| RuntimeError::load(format!("Failed to resolve type <{}>", type_name)))?;
        let annotation = self.resolver.annotation(&descriptor).ok_or_else(|| {
            RuntimeError::load(format!(
                "Failed to find a module annotation on <{}>",
                type_name
            ))
        })?;

        let scope = descriptor.scope().to_string();
        let operations = self.resolver.all_operations(&descriptor);
        let capabilities = CapabilitySet::of(capability.as_ref());

        let mut builder = Module::builder(
            annotation.name.clone(),
            Arc::new(Mutex::new(capability)),
            capabilities,
            self.resolver.clone(),
        )
        .min_host_version(annotation.min_host_version.clone())
        .parameters(self.list_parameters(&descriptor))
        .connection_manager(connection_manager.map(|m| Arc::new(Mutex::new(m))));

        for operation in &operations {
            match &operation.marker {
                Some(OperationMarker::Processor { name, intercepting }) => {
                    builder = builder.processor(self.load_processor(
                        &scope,
                        operation,
                        name.as_deref(),
                        *intercepting,
                    )?);
                }
                Some(OperationMarker::Source { name }) => {
                    builder = builder.source(self.load_source(&scope, operation, name.as_deref())?);
                }
                Some(OperationMarker::Transformer {
                    priority_weighting,
                    source_types,
                }) => {
                    builder = builder.transformer(self.load_transformer(
                        &scope,
                        operation,
                        *priority_weighting,
                        source_types.clone(),
                    )?);
                }
                None => {}
            }
        }

        let module = builder.build()?;
        info!(
            module = %module.name(),
            type_name = %type_name,
            parameters = module.parameters().len(),
            processors = module.processors().len(),
            sources = module.sources().len(),
            transformers = module.transformers().len(),
            "Loaded module"
        );
        Ok(module)
    }

    fn list_parameters(&self, descriptor: &TypeDescriptor) -> Vec<Parameter> {
        self.resolver
            .all_fields(descriptor)
            .into_iter()
            .filter(|f| f.configurable)
            .map(|f| Parameter::new(f.name, f.data_type, f.optional, f.default))
            .collect()
    }

    fn find_adapter(
        &self,
        scope: &str,
        operation: &OperationDescriptor,
        suffix: &str,
    ) -> Result<Arc<TypeDescriptor>> {
        let name = adapter_name(scope, &operation.method, suffix);
        debug!(adapter = %name, method = %operation.method, "Resolving adapter type");
        self.resolver.resolve(&name).ok_or_else(|| {
            RuntimeError::load(format!(
                "Failed to find {} type <{}> for operation <{}>",
                suffix, name, operation.method
            ))
        })
    }

    fn load_processor(
        &self,
        scope: &str,
        operation: &OperationDescriptor,
        name: Option<&str>,
        intercepting: bool,
    ) -> Result<Processor> {
        let adapter = self.find_adapter(scope, operation, MESSAGE_PROCESSOR_SUFFIX)?;
        let handle = adapter
            .new_processor()
            .ok_or_else(|| instantiation_failure(&adapter))?;
        let handle_type = handle.type_name().to_string();

        Ok(Processor::new(
            operation_name(operation, name),
            Arc::new(Mutex::new(handle)),
            handle_type,
            method_parameters(operation, &adapter)?,
            intercepting,
        ))
    }

    fn load_source(
        &self,
        scope: &str,
        operation: &OperationDescriptor,
        name: Option<&str>,
    ) -> Result<Source> {
        let adapter = self.find_adapter(scope, operation, MESSAGE_SOURCE_SUFFIX)?;
        let handle = adapter
            .new_source()
            .ok_or_else(|| instantiation_failure(&adapter))?;
        let handle_type = handle.type_name().to_string();

        Ok(Source::new(
            operation_name(operation, name),
            Arc::new(Mutex::new(handle)),
            handle_type,
            method_parameters(operation, &adapter)?,
        ))
    }

    fn load_transformer(
        &self,
        scope: &str,
        operation: &OperationDescriptor,
        priority_weighting: i32,
        source_types: Vec<DataType>,
    ) -> Result<Transformer> {
        let adapter = self.find_adapter(scope, operation, TRANSFORMER_SUFFIX)?;
        let converter = adapter
            .new_transformer()
            .ok_or_else(|| instantiation_failure(&adapter))?;
        Ok(Transformer::new(converter, priority_weighting, source_types))
    }
}

fn instantiation_failure(adapter: &TypeDescriptor) -> RuntimeError {
    RuntimeError::load(format!("Failed to instantiate <{}>", adapter.name()))
}

/// Qualified adapter name (`org.acme` + `echo` → `org.acme.EchoMessageProcessor`)
pub fn adapter_name(scope: &str, method: &str, suffix: &str) -> String {
    let simple = format!("{}{}", capitalize(method), suffix);
    if scope.is_empty() {
        simple
    } else {
        format!("{}.{}", scope, simple)
    }
}

/// Explicit marker name, or the dash-based method name
fn operation_name(operation: &OperationDescriptor, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => dash_based(&operation.method),
    }
}

/// Dash-based form of a method name (`sendMessage` → `send-message`)
pub fn dash_based(method: &str) -> String {
    let mut out = String::with_capacity(method.len() + 4);
    for c in method.chars() {
        if c.is_uppercase() {
            out.push('-');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn uncapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parameter names recovered from the adapter's `_xxxType` shadow fields
fn shadow_parameter_names(adapter: &TypeDescriptor) -> Vec<String> {
    adapter
        .fields()
        .iter()
        .filter_map(|f| {
            f.name
                .strip_prefix(PARAMETER_TYPE_FIELD_PREFIX)?
                .strip_suffix(PARAMETER_TYPE_FIELD_SUFFIX)
        })
        .filter(|name| !name.is_empty())
        .map(uncapitalize)
        .collect()
}

/// Pair the operation's arguments with the adapter's shadow field names
///
/// Shadow fields are emitted first and in argument order; event-callback
/// arguments have none.
fn method_parameters(
    operation: &OperationDescriptor,
    adapter: &TypeDescriptor,
) -> Result<Vec<Parameter>> {
    let names = shadow_parameter_names(adapter);
    let arguments: Vec<_> = operation
        .arguments
        .iter()
        .filter(|a| a.data_type != DataType::SourceCallback)
        .collect();

    if names.len() < arguments.len() {
        return Err(RuntimeError::load(format!(
            "<{}> declares {} parameter fields but operation <{}> takes {} arguments",
            adapter.name(),
            names.len(),
            operation.method,
            arguments.len()
        )));
    }

    Ok(names
        .into_iter()
        .zip(arguments)
        .map(|(name, argument)| {
            Parameter::new(
                name,
                argument.data_type.clone(),
                argument.optional,
                argument.default.clone(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;
    use capsule_api::testing::{MockCapability, MockConverter, MockProcessor, MockSource};
    use capsule_api::{ArgumentDescriptor, FieldDescriptor, Primitive, Value};

    fn mail_catalog() -> Arc<TypeCatalog> {
        let catalog = TypeCatalog::new();
        catalog
            .register_all([
                TypeDescriptor::builder("org.acme.MailModule")
                    .module("mail")
                    .min_host_version("3.2")
                    .field(FieldDescriptor::configurable("host", DataType::String))
                    .field(
                        FieldDescriptor::configurable("port", DataType::Primitive(Primitive::Int))
                            .optional()
                            .default_value("25"),
                    )
                    .field(FieldDescriptor::new("session", DataType::Any))
                    .operation(
                        OperationDescriptor::processor("sendMessage")
                            .argument(ArgumentDescriptor::new(DataType::String))
                            .argument(ArgumentDescriptor::new(DataType::String).optional()),
                    )
                    .operation(
                        OperationDescriptor::source("inbox")
                            .named("watch")
                            .argument(ArgumentDescriptor::callback())
                            .argument(
                                ArgumentDescriptor::new(DataType::Boxed(Primitive::Long))
                                    .default_value("1000"),
                            ),
                    )
                    .operation(OperationDescriptor::transformer("toText", vec![DataType::Map]))
                    .build(),
                TypeDescriptor::builder("org.acme.SendMessageMessageProcessor")
                    .field(FieldDescriptor::new("_toType", DataType::String))
                    .field(FieldDescriptor::new("_bodyType", DataType::String))
                    .field(FieldDescriptor::new("retryMax", DataType::Primitive(Primitive::Int)))
                    .processor_factory(|| {
                        Box::new(MockProcessor::new("org.acme.SendMessageMessageProcessor"))
                    })
                    .build(),
                TypeDescriptor::builder("org.acme.InboxMessageSource")
                    .field(FieldDescriptor::new("_pollIntervalType", DataType::Boxed(Primitive::Long)))
                    .source_factory(|| Box::new(MockSource::new("org.acme.InboxMessageSource", vec![])))
                    .build(),
                TypeDescriptor::builder("org.acme.ToTextTransformer")
                    .transformer_factory(|| {
                        Arc::new(MockConverter::new(
                            vec![DataType::Map],
                            DataType::String,
                            Value::from("text"),
                        ))
                    })
                    .build(),
            ])
            .unwrap();
        Arc::new(catalog)
    }

    #[test]
    fn test_naming_helpers() {
        assert_eq!(adapter_name("org.acme", "echo", "MessageProcessor"), "org.acme.EchoMessageProcessor");
        assert_eq!(adapter_name("", "tick", "MessageSource"), "TickMessageSource");
        assert_eq!(dash_based("sendMessage"), "send-message");
        assert_eq!(dash_based("echo"), "echo");
        assert_eq!(uncapitalize("PollInterval"), "pollInterval");
    }

    #[test]
    fn test_load_module() {
        let loader = Loader::new(mail_catalog());
        let module = loader
            .load(Box::new(MockCapability::new("org.acme.MailModule")), None)
            .unwrap();

        assert_eq!(module.name(), "mail");
        assert_eq!(module.min_host_version(), Some("3.2"));

        let names: Vec<_> = module.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["host", "port"]);
        assert_eq!(module.parameters()[1].default.as_deref(), Some("25"));

        let processor = module.find_processor("send-message").unwrap();
        assert_eq!(processor.handle_type(), "org.acme.SendMessageMessageProcessor");
        let params: Vec<_> = processor.parameters().iter().map(|p| (p.name.as_str(), p.optional)).collect();
        assert_eq!(params, vec![("to", false), ("body", true)]);

        let source = module.find_source("watch").unwrap();
        assert_eq!(source.parameters().len(), 1);
        assert_eq!(source.parameters()[0].name, "pollInterval");
        assert_eq!(source.parameters()[0].default.as_deref(), Some("1000"));

        assert_eq!(module.transformers().len(), 1);
        assert_eq!(module.transformers()[0].source_types(), [DataType::Map]);
    }

    #[test]
    fn test_missing_annotation_fails() {
        let catalog = TypeCatalog::new();
        catalog
            .register(TypeDescriptor::builder("org.acme.PlainModule").build())
            .unwrap();
        let err = Loader::new(Arc::new(catalog))
            .load(Box::new(MockCapability::new("org.acme.PlainModule")), None)
            .unwrap_err();
        assert!(err.to_string().contains("module annotation"));
    }

    #[test]
    fn test_missing_adapter_fails() {
        let catalog = TypeCatalog::new();
        catalog
            .register(
                TypeDescriptor::builder("org.acme.EchoModule")
                    .module("echo")
                    .operation(OperationDescriptor::processor("echo"))
                    .build(),
            )
            .unwrap();
        let err = Loader::new(Arc::new(catalog))
            .load(Box::new(MockCapability::new("org.acme.EchoModule")), None)
            .unwrap_err();
        assert!(err.to_string().contains("org.acme.EchoMessageProcessor"));
    }

    #[test]
    fn test_shadow_field_mismatch_fails() {
        let catalog = TypeCatalog::new();
        catalog
            .register_all([
                TypeDescriptor::builder("org.acme.EchoModule")
                    .module("echo")
                    .operation(
                        OperationDescriptor::processor("echo")
                            .argument(ArgumentDescriptor::new(DataType::String)),
                    )
                    .build(),
                TypeDescriptor::builder("org.acme.EchoMessageProcessor")
                    .processor_factory(|| Box::new(MockProcessor::new("org.acme.EchoMessageProcessor")))
                    .build(),
            ])
            .unwrap();
        let err = Loader::new(Arc::new(catalog))
            .load(Box::new(MockCapability::new("org.acme.EchoModule")), None)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Load(_)));
    }
}
