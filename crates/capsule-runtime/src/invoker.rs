//! Processor invocation
//!
//! An [`Invoker`] is bound to one processor handle. Construction pushes the
//! retry budget and execution context onto the handle and starts it; a
//! failure there means the invoker is never handed out.

use crate::error::{Result, RuntimeError};
use crate::lifecycle::{run_phase, run_phases};
use crate::module::Processor;
use capsule_api::binder::{self, ParameterMap};
use capsule_api::{
    ExecutionContext, InvocationEvent, LifecycleState, Phase, ProcessorHandle, SharedProcessor,
    Value,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Property receiving the retry budget, when the handle exposes one
pub const RETRY_MAX_PROPERTY: &str = "retryMax";

/// Single-operation execution unit
#[derive(Debug)]
pub struct Invoker {
    operation: String,
    handle: SharedProcessor,
    handle_type: String,
    state: RwLock<LifecycleState>,
}

impl Invoker {
    /// Bootstrap the handle of `processor`
    pub async fn new(
        processor: &Processor,
        context: Arc<ExecutionContext>,
        retry_max: u32,
    ) -> Result<Self> {
        let handle = processor.handle().clone();
        {
            let mut guard = handle.lock().await;

            push_retry_budget(&mut **guard, retry_max)?;
            guard.set_context(context);
            run_phases(&mut **guard, &[Phase::Initialise, Phase::Start]).await?;
        }

        debug!(
            operation = %processor.name(),
            handle = %processor.handle_type(),
            "Invoker ready"
        );
        Ok(Self {
            operation: processor.name().to_string(),
            handle,
            handle_type: processor.handle_type().to_string(),
            state: RwLock::new(LifecycleState::Started),
        })
    }

    /// Processor name
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Concrete type of the handle
    pub fn handle_type(&self) -> &str {
        &self.handle_type
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state.read().clone()
    }

    /// Run the operation with `parameters`
    ///
    /// Parameters are applied and the operation runs under the handle lock,
    /// so concurrent calls never observe each other's parameters.
    pub async fn invoke(&self, parameters: &ParameterMap) -> Result<Value> {
        if !self.state.read().is_started() {
            return Err(RuntimeError::invalid_state(format!(
                "Invoker for <{}> is {}",
                self.operation,
                self.state.read()
            )));
        }

        let mut guard = self.handle.lock().await;
        binder::set_all(&mut **guard, parameters)?;

        trace!(operation = %self.operation, parameters = parameters.len(), "Invoking");
        let event = guard
            .process(InvocationEvent::from_parameters(parameters))
            .await
            .map_err(|e| RuntimeError::invocation(&self.operation, e))?;
        Ok(event.into_payload())
    }

    /// Stop then dispose the handle
    ///
    /// Both phases are attempted; the first failure is returned.
    pub async fn dispose(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        let stopped = run_phase(&mut **guard, Phase::Stop).await;
        let disposed = run_phase(&mut **guard, Phase::Dispose).await;

        *self.state.write() = match (&stopped, &disposed) {
            (Ok(()), Ok(())) => LifecycleState::Disposed,
            (Err(e), _) | (_, Err(e)) => LifecycleState::Failed(e.to_string()),
        };
        stopped.and(disposed)
    }
}

/// Integer widths the budget is offered in, narrowest declaration last
fn budget_candidates(retry_max: u32) -> Vec<Value> {
    let mut candidates = vec![
        Value::Int(i32::try_from(retry_max).unwrap_or(i32::MAX)),
        Value::Long(i64::from(retry_max)),
    ];
    candidates.extend(i16::try_from(retry_max).ok().map(Value::Short));
    candidates.extend(i8::try_from(retry_max).ok().map(Value::Byte));
    candidates
}

/// Write the retry budget onto a handle that declares `retryMax`
///
/// A handle without the member runs without a budget. A handle that declares
/// it but accepts none of the integer widths fails the bootstrap.
fn push_retry_budget(handle: &mut dyn ProcessorHandle, retry_max: u32) -> Result<()> {
    let mut first_failure = None;
    for budget in budget_candidates(retry_max) {
        match binder::set(handle, RETRY_MAX_PROPERTY, &budget) {
            Ok(()) => {
                debug!(handle = %handle.type_name(), retry_max, "Retry budget set");
                return Ok(());
            }
            Err(e) => {
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) if binder::get(handle, RETRY_MAX_PROPERTY).is_ok() => Err(e.into()),
        failure => {
            if let Some(e) = failure {
                trace!(handle = %handle.type_name(), reason = %e, "No retry budget");
            }
            Ok(())
        }
    }
}
