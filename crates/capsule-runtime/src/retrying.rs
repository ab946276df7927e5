//! Dynamic module with retried invocations
//!
//! Only the operation body is retried. Resolving the processor, checking
//! parameters and bootstrapping its invoker happen once, before the policy
//! runs, so a handle that cannot start fails immediately.

use crate::dynamic::DynamicModule;
use crate::error::{Result, RuntimeError};
use crate::invoker::Invoker;
use crate::module::Module;
use crate::registrar::Listener;
use crate::retry::{RetryCallback, RetryPolicy, SimpleRetryPolicy};
use async_trait::async_trait;
use capsule_api::{ParameterMap, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

struct InvocationCallback {
    operation: String,
    invoker: Arc<Invoker>,
    parameters: ParameterMap,
    result: Arc<Mutex<Option<Value>>>,
}

#[async_trait]
impl RetryCallback for InvocationCallback {
    async fn attempt(&self) -> Result<()> {
        let value = self.invoker.invoke(&self.parameters).await?;
        *self.result.lock() = Some(value);
        Ok(())
    }

    fn description(&self) -> String {
        format!("invoke <{}>", self.operation)
    }
}

/// [`DynamicModule`] whose invocations run under a retry policy
#[derive(Debug)]
pub struct RetryingDynamicModule {
    inner: DynamicModule,
    policy: Arc<dyn RetryPolicy>,
}

impl RetryingDynamicModule {
    /// Configure `module` and retry invocations with `policy`
    pub async fn new(
        module: Module,
        overrides: ParameterMap,
        retry_max: u32,
        policy: Arc<dyn RetryPolicy>,
    ) -> Result<Self> {
        Ok(Self {
            inner: DynamicModule::new(module, overrides, retry_max).await?,
            policy,
        })
    }

    /// Retry up to `retry_max` attempts, `frequency` apart
    pub async fn with_simple_policy(
        module: Module,
        overrides: ParameterMap,
        retry_max: u32,
        frequency: Duration,
    ) -> Result<Self> {
        let policy = Arc::new(SimpleRetryPolicy::new(retry_max, frequency));
        Self::new(module, overrides, retry_max, policy).await
    }

    /// Wrapped module
    pub fn inner(&self) -> &DynamicModule {
        &self.inner
    }

    /// Retry policy
    pub fn policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.policy
    }

    /// Invoke processor `name`, retrying failures of the operation body
    ///
    /// When the policy gives up, the failure of the last attempt is returned.
    pub async fn invoke(&self, name: &str, overrides: ParameterMap) -> Result<Value> {
        let (invoker, parameters) = self.inner.prepare_invocation(name, &overrides).await?;

        let result = Arc::new(Mutex::new(None));
        let callback = InvocationCallback {
            operation: name.to_string(),
            invoker,
            parameters,
            result: result.clone(),
        };

        let outcome = self.policy.execute(&callback).await;
        if let Some(failure) = outcome.last_failure {
            return Err(failure);
        }
        debug!(processor = %name, attempts = outcome.attempts, "Invocation completed");

        let value = result.lock().take();
        value.ok_or_else(|| {
            RuntimeError::invalid_state(format!("Invocation of <{}> produced no result", name))
        })
    }

    /// See [`DynamicModule::subscribe`]
    pub async fn subscribe(
        &self,
        name: &str,
        overrides: ParameterMap,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        self.inner.subscribe(name, overrides, listener).await
    }

    /// See [`DynamicModule::unsubscribe`]
    pub async fn unsubscribe(&self, name: &str) -> Result<()> {
        self.inner.unsubscribe(name).await
    }

    /// See [`DynamicModule::dispose`]
    pub async fn dispose(&self) -> Result<()> {
        self.inner.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TypeCatalog;
    use crate::module::Processor;
    use capsule_api::testing::{MockCapability, MockProcessor, MockResponse};
    use capsule_api::{Capabilities, CapabilitySet, ProcessorHandle};

    fn module(processor: MockProcessor) -> Module {
        let capability = MockCapability::new("test.FlakyModule");
        let set = CapabilitySet::of(&capability);
        let capability: Box<dyn Capabilities> = Box::new(capability);
        let handle: Box<dyn ProcessorHandle> = Box::new(processor);

        Module::builder(
            "flaky",
            Arc::new(tokio::sync::Mutex::new(capability)),
            set,
            Arc::new(TypeCatalog::new()),
        )
        .processor(Processor::new(
            "fetch",
            Arc::new(tokio::sync::Mutex::new(handle)),
            "test.FetchMessageProcessor",
            Vec::new(),
            false,
        ))
        .build()
        .unwrap()
    }

    fn flaky(failures: usize) -> MockProcessor {
        MockProcessor::new("test.FetchMessageProcessor")
            .responding(MockResponse::Fixed(Value::from("done")))
            .failing(failures)
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let processor = flaky(2);
        let dynamic = RetryingDynamicModule::with_simple_policy(
            module(processor.clone()),
            ParameterMap::new(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        let value = dynamic.invoke("fetch", ParameterMap::new()).await.unwrap();
        assert_eq!(value, Value::from("done"));
        assert_eq!(processor.invocation_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_failure() {
        let processor = flaky(3);
        let dynamic = RetryingDynamicModule::with_simple_policy(
            module(processor.clone()),
            ParameterMap::new(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        let err = dynamic.invoke("fetch", ParameterMap::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Invocation { .. }));
        assert!(err.to_string().contains("attempt 3"));
        assert_eq!(processor.invocation_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_failure_is_not_retried() {
        let processor = flaky(0).failing_start();
        let probe = processor.probe();
        let dynamic = RetryingDynamicModule::with_simple_policy(
            module(processor),
            ParameterMap::new(),
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        let err = dynamic.invoke("fetch", ParameterMap::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Lifecycle { .. }));
        assert_eq!(probe.initialise_count(), 1);
    }
}
