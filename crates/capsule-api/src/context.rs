//! Execution context and invocation events

use crate::binder::ParameterMap;
use crate::converter::{Converter, ConverterRegistry};
use crate::value::{DataType, Value};
use dashmap::DashMap;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Registry key of the object carrying the module configuration
pub const MODULE_OBJECT_KEY: &str = "moduleObject";

/// Private runtime environment of one dynamic module
///
/// Holds a named-object registry and the converters used to coerce parameter
/// defaults. Every handle bootstrapped by the module receives the same
/// context.
pub struct ExecutionContext {
    id: Uuid,
    objects: DashMap<String, Arc<dyn Any + Send + Sync>>,
    converters: ConverterRegistry,
    disposed: AtomicBool,
}

impl ExecutionContext {
    /// Create a context with the default converters
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            objects: DashMap::new(),
            converters: ConverterRegistry::with_defaults(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Context identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Register `object` under `key`, replacing any previous entry
    pub fn register<T: Any + Send + Sync>(&self, key: impl Into<String>, object: T) {
        let key = key.into();
        debug!(context = %self.id, key = %key, "Registering object");
        self.objects.insert(key, Arc::new(object));
    }

    /// Look up the object registered under `key` as `T`
    pub fn lookup<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let object = self.objects.get(key)?.value().clone();
        object.downcast::<T>().ok()
    }

    /// Check if an object is registered under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Register a converter with a priority weighting
    pub fn register_converter(&self, converter: Arc<dyn Converter>, priority: i32) {
        self.converters.register(converter, priority);
    }

    /// Find the converter from `source` to `target`
    pub fn lookup_converter(
        &self,
        source: &DataType,
        target: &DataType,
    ) -> Option<Arc<dyn Converter>> {
        self.converters.lookup(source, target)
    }

    /// Release every registered object and converter
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(context = %self.id, objects = self.objects.len(), "Disposing execution context");
        self.objects.clear();
        self.converters.clear();
    }

    /// Check if the context was disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("objects", &self.objects.len())
            .field("converters", &self.converters)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Event passed to and returned from a processor handle
#[derive(Debug, Clone)]
pub struct InvocationEvent {
    id: Uuid,
    payload: Value,
    created: Instant,
    metadata: BTreeMap<String, String>,
}

impl InvocationEvent {
    /// Create an event carrying `payload`
    pub fn new(payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            created: Instant::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an event whose nominal input is the invocation parameters
    pub fn from_parameters(parameters: &ParameterMap) -> Self {
        Self::new(Value::Map(parameters.clone()))
    }

    /// Replace the payload, keeping identity and metadata
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Event identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Take the payload
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Creation time
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Metadata entries
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Primitive;

    #[test]
    fn test_registry_lookup() {
        let context = ExecutionContext::new();
        context.register("answer", 42_i32);

        assert!(context.contains("answer"));
        assert_eq!(context.lookup::<i32>("answer").as_deref(), Some(&42));
        assert!(context.lookup::<String>("answer").is_none());
        assert!(context.lookup::<i32>("missing").is_none());
    }

    #[test]
    fn test_default_converters_available() {
        let context = ExecutionContext::new();
        let converter = context
            .lookup_converter(&DataType::String, &DataType::Primitive(Primitive::Int))
            .unwrap();
        assert_eq!(converter.convert(&Value::from("5")).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_dispose_clears_registry() {
        let context = ExecutionContext::new();
        context.register("answer", 42_i32);
        context.dispose();
        context.dispose();

        assert!(context.is_disposed());
        assert!(!context.contains("answer"));
        assert!(context
            .lookup_converter(&DataType::String, &DataType::String)
            .is_none());
    }

    #[test]
    fn test_event_from_parameters() {
        let mut parameters = ParameterMap::new();
        parameters.insert("to".into(), Value::from("ops"));

        let event = InvocationEvent::from_parameters(&parameters).with_metadata("origin", "test");
        assert_eq!(event.payload().as_map().and_then(|m| m.get("to")), Some(&Value::from("ops")));
        assert_eq!(event.metadata().get("origin").map(String::as_str), Some("test"));
        assert_eq!(event.clone().into_payload(), Value::Map(parameters));
    }
}
