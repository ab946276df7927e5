//! Configured module instances
//!
//! A [`DynamicModule`] binds a loaded [`Module`] to one set of parameter
//! overrides and one private execution context. Processors are invoked
//! through cached [`Invoker`]s and sources are subscribed through cached
//! [`Registrar`]s, both keyed by the concrete type of their handle.

use crate::error::{Result, RuntimeError, TypeViolation};
use crate::invoker::Invoker;
use crate::lifecycle::{run_phase, run_phases};
use crate::module::{Module, Parameter};
use crate::registrar::{Listener, Registrar};
use capsule_api::{
    Capability, DataType, ExecutionContext, ParameterMap, Phase, Value, MODULE_OBJECT_KEY,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct Caches {
    invokers: HashMap<String, Arc<Invoker>>,
    registrars: HashMap<String, Arc<Registrar>>,
}

/// A module configured and running in its own execution context
#[derive(Debug)]
pub struct DynamicModule {
    module: Module,
    retry_max: u32,
    context: Arc<ExecutionContext>,
    caches: Mutex<Caches>,
    disposed: AtomicBool,
}

impl DynamicModule {
    /// Retry budget used when none is configured
    pub const DEFAULT_RETRY_MAX: u32 = 5;

    /// Configure `module` with `overrides` and start it
    ///
    /// Every override must be assignable to its declared parameter type and
    /// every required parameter must be supplied; all violations are
    /// reported together.
    pub async fn new(module: Module, overrides: ParameterMap, retry_max: u32) -> Result<Self> {
        if retry_max == 0 {
            return Err(RuntimeError::config("retry_max must be greater than 0"));
        }
        validate(module.parameters(), &overrides)?;

        let context = Arc::new(ExecutionContext::new());
        match configure(&module, &context, &overrides).await {
            Ok(()) => {
                info!(
                    module = %module.name(),
                    context = %context.id(),
                    retry_max,
                    "Dynamic module started"
                );
                Ok(Self {
                    module,
                    retry_max,
                    context,
                    caches: Mutex::new(Caches::default()),
                    disposed: AtomicBool::new(false),
                })
            }
            Err(e) => {
                error!(module = %module.name(), error = %e, "Failed to start dynamic module");
                context.dispose();
                Err(e)
            }
        }
    }

    /// Create with [`Self::DEFAULT_RETRY_MAX`]
    pub async fn with_default_retry(module: Module, overrides: ParameterMap) -> Result<Self> {
        Self::new(module, overrides, Self::DEFAULT_RETRY_MAX).await
    }

    /// Underlying module
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Private execution context
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Retry budget pushed onto processor handles
    pub fn retry_max(&self) -> u32 {
        self.retry_max
    }

    /// Whether [`Self::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Invoke processor `name` with `overrides`
    pub async fn invoke(&self, name: &str, overrides: ParameterMap) -> Result<Value> {
        let (invoker, parameters) = self.prepare_invocation(name, &overrides).await?;
        invoker.invoke(&parameters).await
    }

    /// Resolve processor `name` and get or bootstrap its invoker
    pub(crate) async fn prepare_invocation(
        &self,
        name: &str,
        overrides: &ParameterMap,
    ) -> Result<(Arc<Invoker>, ParameterMap)> {
        self.ensure_active()?;
        let processor = self
            .module
            .find_processor(name)
            .ok_or_else(|| RuntimeError::processor_not_found(name))?;

        validate(processor.parameters(), overrides)?;
        let parameters = merge(name, processor.parameters(), overrides, &self.context)?;

        let mut caches = self.caches.lock().await;
        let invoker = match caches.invokers.get(processor.handle_type()) {
            Some(invoker) => {
                debug!(processor = %name, handle = %processor.handle_type(), "Reusing invoker");
                invoker.clone()
            }
            None => {
                let invoker =
                    Arc::new(Invoker::new(processor, self.context.clone(), self.retry_max).await?);
                caches
                    .invokers
                    .insert(processor.handle_type().to_string(), invoker.clone());
                invoker
            }
        };
        Ok((invoker, parameters))
    }

    /// Subscribe `listener` to source `name`
    pub async fn subscribe(
        &self,
        name: &str,
        overrides: ParameterMap,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        self.ensure_active()?;
        let source = self
            .module
            .find_source(name)
            .ok_or_else(|| RuntimeError::source_not_found(name))?;

        let mut caches = self.caches.lock().await;
        if caches.registrars.contains_key(source.handle_type()) {
            return Err(RuntimeError::Conflict(name.to_string()));
        }

        validate(source.parameters(), &overrides)?;
        let parameters = merge(name, source.parameters(), &overrides, &self.context)?;

        let registrar = Registrar::new(source, self.context.clone()).await?;
        if let Err(e) = registrar.start(&parameters, listener).await {
            if let Err(cleanup) = registrar.dispose().await {
                warn!(source = %name, error = %cleanup, "Failed to release source after failed start");
            }
            return Err(e);
        }

        caches
            .registrars
            .insert(source.handle_type().to_string(), Arc::new(registrar));
        info!(module = %self.module.name(), source = %name, "Subscribed");
        Ok(())
    }

    /// Stop source `name`
    ///
    /// The registrar stays cached, so the source cannot be subscribed again
    /// on this instance.
    pub async fn unsubscribe(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let source = self
            .module
            .find_source(name)
            .ok_or_else(|| RuntimeError::source_not_found(name))?;

        let registrar = self
            .caches
            .lock()
            .await
            .registrars
            .get(source.handle_type())
            .cloned()
            .ok_or_else(|| RuntimeError::NotSubscribed(name.to_string()))?;

        registrar.stop().await?;
        info!(module = %self.module.name(), source = %name, "Unsubscribed");
        Ok(())
    }

    /// Stop and release every source, invoker and module object
    ///
    /// Every resource is released even when some fail. Source stop failures
    /// are logged only; the other failures are reported together once
    /// everything has been released. Calling this again is a no-op.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut failures = Vec::new();
        let caches = std::mem::take(&mut *self.caches.lock().await);

        for (handle_type, registrar) in caches.registrars {
            if registrar.state().is_started() {
                if let Err(e) = registrar.stop().await {
                    warn!(handle = %handle_type, error = %e, "Failed to stop source");
                }
            }
            if let Err(e) = registrar.dispose().await {
                warn!(handle = %handle_type, error = %e, "Failed to dispose source");
            }
        }

        for (handle_type, invoker) in caches.invokers {
            if let Err(e) = invoker.dispose().await {
                warn!(handle = %handle_type, error = %e, "Failed to dispose invoker");
                failures.push(e.to_string());
            }
        }

        if self.module.capabilities().contains(Capability::Lifecycle) {
            let mut capability = self.module.capability().lock().await;
            if let Err(e) = run_phases(&mut **capability, &[Phase::Stop, Phase::Dispose]).await {
                failures.push(e.to_string());
            }
        }
        if let Some(manager) = self.module.connection_manager() {
            let mut manager = manager.lock().await;
            if let Err(e) = run_phase(&mut **manager, Phase::Dispose).await {
                failures.push(e.to_string());
            }
        }

        self.context.dispose();
        info!(module = %self.module.name(), failures = failures.len(), "Dynamic module disposed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::Dispose(failures))
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(RuntimeError::invalid_state(format!(
                "Module <{}> has been disposed",
                self.module.name()
            )));
        }
        Ok(())
    }
}

async fn configure(
    module: &Module,
    context: &Arc<ExecutionContext>,
    overrides: &ParameterMap,
) -> Result<()> {
    for transformer in module.transformers() {
        context.register_converter(transformer.as_converter(), transformer.priority_weighting());
    }

    let parameters = merge(module.name(), module.parameters(), overrides, context)?;
    let module_object = module.module_object();
    module_object.set_all(&parameters).await?;

    let lifecycle = module.capabilities().contains(Capability::Lifecycle);
    if lifecycle {
        let mut capability = module.capability().lock().await;
        run_phases(&mut **capability, &[Phase::Initialise, Phase::Start]).await?;
    }
    if let Some(manager) = module.connection_manager() {
        let initialised = {
            let mut manager = manager.lock().await;
            run_phase(&mut **manager, Phase::Initialise).await
        };
        if let Err(e) = initialised {
            if lifecycle {
                let mut capability = module.capability().lock().await;
                if let Err(stop) = run_phase(&mut **capability, Phase::Stop).await {
                    warn!(module = %module.name(), error = %stop, "Failed to stop capability");
                }
            }
            return Err(e);
        }
    }

    context.register(MODULE_OBJECT_KEY, module_object);
    Ok(())
}

/// Check override types and required parameters, batching every violation
fn validate(parameters: &[Parameter], overrides: &ParameterMap) -> Result<()> {
    let violations: Vec<_> = parameters
        .iter()
        .filter_map(|p| {
            let value = overrides.get(&p.name)?;
            (!p.data_type.accepts(value)).then(|| TypeViolation {
                parameter: p.name.clone(),
                expected: p.data_type.to_string(),
                actual: value.type_name(),
            })
        })
        .collect();
    if !violations.is_empty() {
        return Err(RuntimeError::ParameterType(violations));
    }

    let missing: Vec<_> = parameters
        .iter()
        .filter(|p| p.is_required() && !overrides.contains_key(&p.name))
        .map(|p| p.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(RuntimeError::MissingParameter(missing));
    }
    Ok(())
}

/// Converted defaults overlaid with `overrides`; unknown keys are dropped
fn merge(
    scope: &str,
    parameters: &[Parameter],
    overrides: &ParameterMap,
    context: &ExecutionContext,
) -> Result<ParameterMap> {
    for key in overrides.keys() {
        if !parameters.iter().any(|p| &p.name == key) {
            warn!(scope, parameter = %key, "Dropping unknown parameter");
        }
    }

    let mut merged = ParameterMap::new();
    for parameter in parameters {
        if let Some(value) = overrides.get(&parameter.name) {
            merged.insert(parameter.name.clone(), value.clone());
        } else if let Some(default) = &parameter.default {
            merged.insert(
                parameter.name.clone(),
                convert_default(parameter, default, context)?,
            );
        }
    }
    Ok(merged)
}

fn convert_default(parameter: &Parameter, default: &str, context: &ExecutionContext) -> Result<Value> {
    let converter = context
        .lookup_converter(&DataType::String, &parameter.data_type)
        .ok_or_else(|| {
            RuntimeError::conversion(format!(
                "No converter from string to {} for <{}>",
                parameter.data_type, parameter.name
            ))
        })?;
    converter.convert(&Value::from(default)).map_err(|e| {
        RuntimeError::conversion(format!(
            "Default <{}> of <{}> is not a valid {}: {}",
            default, parameter.name, parameter.data_type, e
        ))
    })
}
