//! Generated operation handles
//!
//! The code generator emits one adapter type per module operation. Processor
//! adapters run a single request/response call, source adapters produce
//! events on their own task between `start` and `stop`.

use crate::bindable::Bindable;
use crate::context::{ExecutionContext, InvocationEvent};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Receives the execution context a handle runs in
pub trait ContextAware {
    /// Inject the execution context
    fn set_context(&mut self, _context: Arc<ExecutionContext>) {}
}

/// Adapter for a request/response operation
#[async_trait]
pub trait ProcessorHandle: Bindable + Lifecycle + ContextAware + fmt::Debug {
    /// Run the operation against `event` and return the resulting event
    async fn process(&mut self, event: InvocationEvent) -> Result<InvocationEvent>;
}

/// Adapter for an event-producing operation
pub trait SourceHandle: Bindable + Lifecycle + ContextAware + fmt::Debug {
    /// Install the listener produced events are delivered to
    fn set_listener(&mut self, listener: Arc<dyn EventListener>);
}

/// Callback invoked for every event a source produces
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handle one event
    async fn on_event(&self, event: InvocationEvent) -> Result<()>;
}

/// Processor handle shared between the module descriptor and its invoker
pub type SharedProcessor = Arc<Mutex<Box<dyn ProcessorHandle>>>;

/// Source handle shared between the module descriptor and its registrar
pub type SharedSource = Arc<Mutex<Box<dyn SourceHandle>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Upper {
        context: Option<Arc<ExecutionContext>>,
    }

    impl Bindable for Upper {
        fn type_name(&self) -> &str {
            "test.UpperMessageProcessor"
        }
    }

    #[async_trait]
    impl Lifecycle for Upper {}

    impl ContextAware for Upper {
        fn set_context(&mut self, context: Arc<ExecutionContext>) {
            self.context = Some(context);
        }
    }

    #[async_trait]
    impl ProcessorHandle for Upper {
        async fn process(&mut self, event: InvocationEvent) -> Result<InvocationEvent> {
            let text = event.payload().as_str().unwrap_or_default().to_uppercase();
            Ok(event.with_payload(Value::from(text)))
        }
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl EventListener for Counter {
        async fn on_event(&self, _event: InvocationEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_processor_through_shared_handle() {
        let boxed: Box<dyn ProcessorHandle> = Box::new(Upper::default());
        let handle: SharedProcessor = Arc::new(Mutex::new(boxed));
        let mut guard = handle.lock().await;
        guard.set_context(Arc::new(ExecutionContext::new()));

        let out = guard
            .process(InvocationEvent::new(Value::from("abc")))
            .await
            .unwrap();
        assert_eq!(out.payload(), &Value::from("ABC"));
    }

    #[tokio::test]
    async fn test_listener_receives_events() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let listener: Arc<dyn EventListener> = counter.clone();
        listener.on_event(InvocationEvent::new(Value::Null)).await.unwrap();
        listener.on_event(InvocationEvent::new(Value::Null)).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
