//! Source subscription
//!
//! A [`Registrar`] owns the subscription to one source handle. The handle is
//! initialised once at construction; `start` installs the listener and lets
//! the handle produce on its own task until `stop`.

use crate::error::{Result, RuntimeError};
use crate::lifecycle::run_phase;
use crate::module::Source;
use async_trait::async_trait;
use capsule_api::binder::{self, ParameterMap};
use capsule_api::{
    EventListener, ExecutionContext, InvocationEvent, LifecycleState, Phase, SharedSource, Value,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Receives the payload of every event a subscribed source produces
pub trait Listener: Send + Sync {
    /// Handle one payload
    fn on_event(&self, payload: Value);
}

impl<F> Listener for F
where
    F: Fn(Value) + Send + Sync,
{
    fn on_event(&self, payload: Value) {
        self(payload)
    }
}

/// Forwards handle events to a [`Listener`]
struct ListenerAdapter {
    source: String,
    listener: Arc<dyn Listener>,
}

#[async_trait]
impl EventListener for ListenerAdapter {
    async fn on_event(&self, event: InvocationEvent) -> capsule_api::Result<()> {
        trace!(source = %self.source, event = %event.id(), "Forwarding event");
        self.listener.on_event(event.into_payload());
        Ok(())
    }
}

/// Single-source subscription unit
pub struct Registrar {
    source: String,
    handle: SharedSource,
    handle_type: String,
    state: RwLock<LifecycleState>,
}

impl Registrar {
    /// Bind to the handle of `source` and initialise it
    pub async fn new(source: &Source, context: Arc<ExecutionContext>) -> Result<Self> {
        let handle = source.handle().clone();
        {
            let mut guard = handle.lock().await;
            guard.set_context(context);
            run_phase(&mut **guard, Phase::Initialise).await?;
        }

        debug!(source = %source.name(), handle = %source.handle_type(), "Registrar ready");
        Ok(Self {
            source: source.name().to_string(),
            handle,
            handle_type: source.handle_type().to_string(),
            state: RwLock::new(LifecycleState::Initialised),
        })
    }

    /// Source name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Concrete type of the handle
    pub fn handle_type(&self) -> &str {
        &self.handle_type
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state.read().clone()
    }

    /// Apply `parameters`, install `listener` and start producing
    pub async fn start(&self, parameters: &ParameterMap, listener: Arc<dyn Listener>) -> Result<()> {
        if self.state.read().is_started() {
            return Err(RuntimeError::Conflict(self.source.clone()));
        }

        let mut guard = self.handle.lock().await;
        binder::set_all(&mut **guard, parameters)?;
        guard.set_listener(Arc::new(ListenerAdapter {
            source: self.source.clone(),
            listener,
        }));

        let started = run_phase(&mut **guard, Phase::Start).await;
        *self.state.write() = match &started {
            Ok(()) => LifecycleState::Started,
            Err(e) => LifecycleState::Failed(e.to_string()),
        };
        if started.is_ok() {
            info!(source = %self.source, "Source started");
        }
        started
    }

    /// Stop producing
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        let stopped = run_phase(&mut **guard, Phase::Stop).await;
        *self.state.write() = match &stopped {
            Ok(()) => LifecycleState::Stopped,
            Err(e) => LifecycleState::Failed(e.to_string()),
        };
        if stopped.is_ok() {
            info!(source = %self.source, "Source stopped");
        }
        stopped
    }

    /// Release the handle
    pub async fn dispose(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        let disposed = run_phase(&mut **guard, Phase::Dispose).await;
        *self.state.write() = match &disposed {
            Ok(()) => LifecycleState::Disposed,
            Err(e) => LifecycleState::Failed(e.to_string()),
        };
        disposed
    }
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("source", &self.source)
            .field("handle_type", &self.handle_type)
            .field("state", &*self.state.read())
            .finish()
    }
}
