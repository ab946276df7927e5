//! Mock implementations for testing

use super::helpers::LifecycleProbe;
use crate::bindable::{Bindable, FieldSet};
use crate::capability::{Capabilities, Capability, CapabilitySet, ConnectionManager, ModuleObject};
use crate::context::{ExecutionContext, InvocationEvent, MODULE_OBJECT_KEY};
use crate::converter::Converter;
use crate::error::{OperationError, Result};
use crate::handle::{ContextAware, EventListener, ProcessorHandle, SourceHandle};
use crate::lifecycle::{Lifecycle, Phase};
use crate::value::{DataType, Primitive, Value};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Mock capability object backed by a [`FieldSet`]
#[derive(Debug, Clone)]
pub struct MockCapability {
    type_name: String,
    capabilities: CapabilitySet,
    fields: FieldSet,
    probe: LifecycleProbe,
    fail_start: bool,
}

impl MockCapability {
    /// Create a lifecycle-capable mock
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            capabilities: CapabilitySet::default().with(Capability::Lifecycle),
            fields: FieldSet::new(),
            probe: LifecycleProbe::new(),
            fail_start: false,
        }
    }

    /// Declare a field
    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType, initial: Value) -> Self {
        self.fields = self.fields.declare(name, data_type, initial);
        self
    }

    /// Declare connection management
    pub fn with_connection_management(mut self) -> Self {
        self.capabilities = self.capabilities.with(Capability::ConnectionManagement);
        self
    }

    /// Drop the lifecycle capability
    pub fn without_lifecycle(mut self) -> Self {
        self.capabilities.lifecycle = false;
        self
    }

    /// Share an existing probe
    pub fn with_probe(mut self, probe: LifecycleProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Make `start` fail
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Lifecycle probe
    pub fn probe(&self) -> LifecycleProbe {
        self.probe.clone()
    }
}

impl Bindable for MockCapability {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Option<Result<()>> {
        self.fields.set(&self.type_name, name, value)
    }
}

#[async_trait]
impl Lifecycle for MockCapability {
    async fn initialise(&mut self) -> Result<()> {
        self.probe.record(Phase::Initialise);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(OperationError::runtime("Simulated start failure"));
        }
        self.probe.record(Phase::Start);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.record(Phase::Stop);
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.probe.record(Phase::Dispose);
        Ok(())
    }
}

impl Capabilities for MockCapability {
    fn is_capable_of(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Mock connection manager exposing the credential properties
#[derive(Debug, Clone)]
pub struct MockConnectionManager {
    type_name: String,
    fields: FieldSet,
    probe: LifecycleProbe,
    fail_initialise: bool,
}

impl MockConnectionManager {
    /// Create a mock with `username`, `password` and `securityToken` fields
    pub fn new(type_name: impl Into<String>) -> Self {
        let nullable = DataType::String;
        Self {
            type_name: type_name.into(),
            fields: FieldSet::new()
                .declare("username", nullable.clone(), Value::Null)
                .declare("password", nullable.clone(), Value::Null)
                .declare("securityToken", nullable, Value::Null),
            probe: LifecycleProbe::new(),
            fail_initialise: false,
        }
    }

    /// Declare an additional field
    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType, initial: Value) -> Self {
        self.fields = self.fields.declare(name, data_type, initial);
        self
    }

    /// Share an existing probe
    pub fn with_probe(mut self, probe: LifecycleProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Make `initialise` fail
    pub fn failing_initialise(mut self) -> Self {
        self.fail_initialise = true;
        self
    }
}

impl Bindable for MockConnectionManager {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Option<Result<()>> {
        self.fields.set(&self.type_name, name, value)
    }
}

#[async_trait]
impl Lifecycle for MockConnectionManager {
    async fn initialise(&mut self) -> Result<()> {
        if self.fail_initialise {
            return Err(OperationError::init("Simulated initialise failure"));
        }
        self.probe.record(Phase::Initialise);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.probe.record(Phase::Start);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.record(Phase::Stop);
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.probe.record(Phase::Dispose);
        Ok(())
    }
}

impl ConnectionManager for MockConnectionManager {}

/// What a [`MockProcessor`] answers
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return the incoming event unchanged
    Echo,
    /// Return a fixed value
    Fixed(Value),
    /// Return a property of the module object registered in the context
    ModuleProperty(String),
    /// Return one of the processor's own parameters
    Parameter(String),
}

/// Mock processor handle
///
/// Clones share their counters, so a clone can be moved into a descriptor
/// factory while the test keeps the original.
#[derive(Debug, Clone)]
pub struct MockProcessor {
    type_name: String,
    fields: FieldSet,
    probe: LifecycleProbe,
    response: MockResponse,
    failures: Arc<AtomicUsize>,
    invocations: Arc<AtomicUsize>,
    context: Option<Arc<ExecutionContext>>,
    fail_start: bool,
    fail_dispose: bool,
}

impl MockProcessor {
    /// Create an echoing processor
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: FieldSet::new(),
            probe: LifecycleProbe::new(),
            response: MockResponse::Echo,
            failures: Arc::new(AtomicUsize::new(0)),
            invocations: Arc::new(AtomicUsize::new(0)),
            context: None,
            fail_start: false,
            fail_dispose: false,
        }
    }

    /// Declare a parameter field
    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType, initial: Value) -> Self {
        self.fields = self.fields.declare(name, data_type, initial);
        self
    }

    /// Expose a `retryMax` field
    pub fn with_retry_max(self) -> Self {
        self.with_field("retryMax", DataType::Primitive(Primitive::Int), Value::Int(0))
    }

    /// Set the response
    pub fn responding(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }

    /// Fail the next `count` invocations
    pub fn failing(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// Make `start` fail
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `dispose` fail
    pub fn failing_dispose(mut self) -> Self {
        self.fail_dispose = true;
        self
    }

    /// Share an existing probe
    pub fn with_probe(mut self, probe: LifecycleProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Lifecycle probe
    pub fn probe(&self) -> LifecycleProbe {
        self.probe.clone()
    }

    /// Number of `process` calls, failed ones included
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    async fn respond(&self, event: InvocationEvent) -> Result<InvocationEvent> {
        match &self.response {
            MockResponse::Echo => Ok(event),
            MockResponse::Fixed(value) => Ok(event.with_payload(value.clone())),
            MockResponse::Parameter(name) => {
                let value = self.fields.get(name).ok_or_else(|| {
                    OperationError::runtime(format!("Unknown parameter <{}>", name))
                })?;
                Ok(event.with_payload(value))
            }
            MockResponse::ModuleProperty(property) => {
                let object = self
                    .context
                    .as_ref()
                    .and_then(|c| c.lookup::<ModuleObject>(MODULE_OBJECT_KEY))
                    .ok_or_else(|| OperationError::invalid_state("No module object registered"))?;
                let value = object.get(property).await?;
                Ok(event.with_payload(value))
            }
        }
    }
}

impl Bindable for MockProcessor {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Option<Result<()>> {
        self.fields.set(&self.type_name, name, value)
    }
}

#[async_trait]
impl Lifecycle for MockProcessor {
    async fn initialise(&mut self) -> Result<()> {
        self.probe.record(Phase::Initialise);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(OperationError::runtime("Simulated start failure"));
        }
        self.probe.record(Phase::Start);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.probe.record(Phase::Stop);
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        if self.fail_dispose {
            return Err(OperationError::runtime("Simulated dispose failure"));
        }
        self.probe.record(Phase::Dispose);
        Ok(())
    }
}

impl ContextAware for MockProcessor {
    fn set_context(&mut self, context: Arc<ExecutionContext>) {
        self.context = Some(context);
    }
}

#[async_trait]
impl ProcessorHandle for MockProcessor {
    async fn process(&mut self, event: InvocationEvent) -> Result<InvocationEvent> {
        let attempt = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OperationError::runtime(format!(
                "Simulated failure on attempt {}",
                attempt
            )));
        }
        self.respond(event).await
    }
}

/// Mock source handle emitting a fixed list of payloads once started
pub struct MockSource {
    type_name: String,
    fields: FieldSet,
    probe: LifecycleProbe,
    payloads: Vec<Value>,
    fail_stop: bool,
    listener: Option<Arc<dyn EventListener>>,
    task: Option<JoinHandle<()>>,
}

impl MockSource {
    /// Create a source emitting `payloads`
    pub fn new(type_name: impl Into<String>, payloads: Vec<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: FieldSet::new(),
            probe: LifecycleProbe::new(),
            payloads,
            fail_stop: false,
            listener: None,
            task: None,
        }
    }

    /// Declare a parameter field
    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType, initial: Value) -> Self {
        self.fields = self.fields.declare(name, data_type, initial);
        self
    }

    /// Make `stop` fail
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Share an existing probe
    pub fn with_probe(mut self, probe: LifecycleProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Lifecycle probe
    pub fn probe(&self) -> LifecycleProbe {
        self.probe.clone()
    }
}

/// Clones share configuration and probe but not the running task or listener
impl Clone for MockSource {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            fields: self.fields.clone(),
            probe: self.probe.clone(),
            payloads: self.payloads.clone(),
            fail_stop: self.fail_stop,
            listener: None,
            task: None,
        }
    }
}

impl fmt::Debug for MockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSource")
            .field("type_name", &self.type_name)
            .field("payloads", &self.payloads.len())
            .field("listening", &self.listener.is_some())
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl Bindable for MockSource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name)
    }

    fn set_field(&mut self, name: &str, value: &Value) -> Option<Result<()>> {
        self.fields.set(&self.type_name, name, value)
    }
}

#[async_trait]
impl Lifecycle for MockSource {
    async fn initialise(&mut self) -> Result<()> {
        self.probe.record(Phase::Initialise);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let listener = self
            .listener
            .clone()
            .ok_or_else(|| OperationError::invalid_state("No listener installed"))?;
        let payloads = self.payloads.clone();

        self.task = Some(tokio::spawn(async move {
            for payload in payloads {
                if listener.on_event(InvocationEvent::new(payload)).await.is_err() {
                    break;
                }
            }
        }));
        self.probe.record(Phase::Start);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.fail_stop {
            return Err(OperationError::runtime("Simulated stop failure"));
        }
        self.probe.record(Phase::Stop);
        Ok(())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.probe.record(Phase::Dispose);
        Ok(())
    }
}

impl ContextAware for MockSource {}

impl SourceHandle for MockSource {
    fn set_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listener = Some(listener);
    }
}

/// Mock converter returning a fixed value
#[derive(Debug, Clone)]
pub struct MockConverter {
    source_types: Vec<DataType>,
    return_type: DataType,
    output: Value,
    calls: Arc<AtomicUsize>,
}

impl MockConverter {
    /// Create a converter from `source_types` to `return_type`
    pub fn new(source_types: Vec<DataType>, return_type: DataType, output: Value) -> Self {
        Self {
            source_types,
            return_type,
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `convert` calls
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Converter for MockConverter {
    fn source_types(&self) -> &[DataType] {
        &self.source_types
    }

    fn return_type(&self) -> &DataType {
        &self.return_type
    }

    fn convert(&self, _value: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder;
    use crate::testing::CollectingListener;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn test_processor_fails_then_succeeds() {
        let processor = MockProcessor::new("test.PingMessageProcessor")
            .responding(MockResponse::Fixed(Value::from("pong")))
            .failing(2);
        let mut handle = processor.clone();

        let event = InvocationEvent::new(Value::Null);
        assert!(handle.process(event.clone()).await.is_err());
        assert!(handle.process(event.clone()).await.is_err());
        let out = handle.process(event).await.unwrap();

        assert_eq!(out.into_payload(), Value::from("pong"));
        assert_eq!(processor.invocation_count(), 3);
    }

    #[tokio::test]
    async fn test_processor_reads_module_object() {
        let capability: Box<dyn Capabilities> = Box::new(
            MockCapability::new("test.EchoModule").with_field("greeting", DataType::String, Value::from("hi")),
        );
        let context = Arc::new(ExecutionContext::new());
        context.register(
            MODULE_OBJECT_KEY,
            ModuleObject::Capability(Arc::new(Mutex::new(capability))),
        );

        let mut processor = MockProcessor::new("test.EchoMessageProcessor")
            .responding(MockResponse::ModuleProperty("greeting".into()));
        processor.set_context(context);

        let out = processor.process(InvocationEvent::new(Value::Null)).await.unwrap();
        assert_eq!(out.payload(), &Value::from("hi"));
    }

    #[tokio::test]
    async fn test_processor_parameters_via_binder() {
        let mut processor = MockProcessor::new("test.SendMessageProcessor")
            .with_field("to", DataType::String, Value::Null)
            .with_retry_max()
            .responding(MockResponse::Parameter("to".into()));

        binder::set(&mut processor, "to", &Value::from("ops")).unwrap();
        binder::set(&mut processor, "retryMax", &Value::Int(3)).unwrap();

        let out = processor.process(InvocationEvent::new(Value::Null)).await.unwrap();
        assert_eq!(out.payload(), &Value::from("ops"));
        assert_eq!(processor.field("retryMax"), Some(Value::Int(3)));
    }

    #[tokio::test]
    async fn test_source_emits_until_stopped() {
        let listener = CollectingListener::new();
        let mut source = MockSource::new("test.TickMessageSource", vec![Value::Int(1), Value::Int(2)]);
        source.set_listener(Arc::new(listener.clone()));

        source.start().await.unwrap();
        assert!(listener.wait_for(2, Duration::from_secs(1)).await);
        source.stop().await.unwrap();

        assert_eq!(listener.payloads(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(source.probe().stop_count(), 1);
    }

    #[tokio::test]
    async fn test_source_requires_listener() {
        let mut source = MockSource::new("test.TickMessageSource", vec![]);
        assert!(source.start().await.is_err());
    }

    #[test]
    fn test_converter_counts_calls() {
        let converter = MockConverter::new(vec![DataType::Any], DataType::String, Value::from("x"));
        assert_eq!(converter.convert(&Value::Int(1)).unwrap(), Value::from("x"));
        assert_eq!(converter.call_count(), 1);
    }
}
