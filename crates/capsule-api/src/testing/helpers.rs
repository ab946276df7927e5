//! Shared test helpers

use crate::context::InvocationEvent;
use crate::error::Result;
use crate::handle::EventListener;
use crate::lifecycle::Phase;
use crate::value::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts lifecycle phases; clones share the same counters
#[derive(Debug, Clone, Default)]
pub struct LifecycleProbe {
    initialised: Arc<AtomicUsize>,
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
}

impl LifecycleProbe {
    /// Create a probe with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, phase: Phase) -> &AtomicUsize {
        match phase {
            Phase::Initialise => &self.initialised,
            Phase::Start => &self.started,
            Phase::Stop => &self.stopped,
            Phase::Dispose => &self.disposed,
        }
    }

    /// Record a completed phase
    pub fn record(&self, phase: Phase) {
        self.counter(phase).fetch_add(1, Ordering::SeqCst);
    }

    /// Number of times `phase` completed
    pub fn count(&self, phase: Phase) -> usize {
        self.counter(phase).load(Ordering::SeqCst)
    }

    /// Number of completed `initialise` calls
    pub fn initialise_count(&self) -> usize {
        self.count(Phase::Initialise)
    }

    /// Number of completed `start` calls
    pub fn start_count(&self) -> usize {
        self.count(Phase::Start)
    }

    /// Number of completed `stop` calls
    pub fn stop_count(&self) -> usize {
        self.count(Phase::Stop)
    }

    /// Number of completed `dispose` calls
    pub fn dispose_count(&self) -> usize {
        self.count(Phase::Dispose)
    }
}

/// Event listener collecting every payload it receives
#[derive(Debug, Clone, Default)]
pub struct CollectingListener {
    payloads: Arc<Mutex<Vec<Value>>>,
}

impl CollectingListener {
    /// Create an empty listener
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one payload
    pub fn record(&self, payload: Value) {
        self.payloads.lock().push(payload);
    }

    /// Payloads received so far
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().clone()
    }

    /// Number of payloads received
    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    /// Check if nothing was received
    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }

    /// Wait until at least `count` payloads arrived or `timeout` elapsed
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl EventListener for CollectingListener {
    async fn on_event(&self, event: InvocationEvent) -> Result<()> {
        self.record(event.into_payload());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_clones_share_counters() {
        let probe = LifecycleProbe::new();
        let clone = probe.clone();
        clone.record(Phase::Start);
        clone.record(Phase::Start);
        probe.record(Phase::Stop);

        assert_eq!(probe.start_count(), 2);
        assert_eq!(clone.stop_count(), 1);
        assert_eq!(probe.dispose_count(), 0);
    }

    #[tokio::test]
    async fn test_collecting_listener() {
        let listener = CollectingListener::new();
        listener
            .on_event(InvocationEvent::new(Value::Int(1)))
            .await
            .unwrap();

        assert!(listener.wait_for(1, Duration::from_millis(50)).await);
        assert!(!listener.wait_for(2, Duration::from_millis(20)).await);
        assert_eq!(listener.payloads(), vec![Value::Int(1)]);
    }
}
