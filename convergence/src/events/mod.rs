//! Event sink for cluster observability events.
//!
//! Reconciliation steps report noteworthy actions through [`EventRecorder`].
//! Recording is fire-and-forget: a recorder never fails the step.
//!
//! Implementations:
//!
//! 1. [`TracingRecorder`]: writes each event as a structured log line.
//! 2. [`MemoryRecorder`]: keeps events in memory for tests and dry runs.
//!
//! A pair `(A, B)` of recorders is itself a recorder that hands every event
//! to both, in order.

pub mod types;

pub use types::{ClusterEvent, EventType, REASON_EXCLUDING_PROCESSES};

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Receives cluster events.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: ClusterEvent);
}

impl<T: EventRecorder + ?Sized> EventRecorder for Arc<T> {
    fn record(&self, event: ClusterEvent) {
        (**self).record(event)
    }
}

impl<A: EventRecorder, B: EventRecorder> EventRecorder for (A, B) {
    fn record(&self, event: ClusterEvent) {
        self.0.record(event.clone());
        self.1.record(event);
    }
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, event: ClusterEvent) {
        match event.event_type {
            EventType::Normal => info!(
                namespace = %event.cluster.namespace,
                cluster = %event.cluster.name,
                reason = %event.reason,
                "{}",
                event.message
            ),
            EventType::Warning => warn!(
                namespace = %event.cluster.namespace,
                cluster = %event.cluster.name,
                reason = %event.reason,
                "{}",
                event.message
            ),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<ClusterEvent>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events with the given reason tag.
    pub fn with_reason(&self, reason: &str) -> Vec<ClusterEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, event: ClusterEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRef;

    #[test]
    fn test_memory_recorder_collects() {
        let recorder = MemoryRecorder::new();
        assert!(recorder.is_empty());

        let cluster = ClusterRef::new("ns", "c");
        recorder.record(ClusterEvent::normal(&cluster, "ExcludingProcesses", "Excluding [1.1.1.1]"));
        recorder.record(ClusterEvent::warning(&cluster, "LockHeld", "waiting"));

        assert_eq!(recorder.len(), 2);
        let excluded = recorder.with_reason("ExcludingProcesses");
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].event_type, EventType::Normal);
        assert_eq!(excluded[0].message, "Excluding [1.1.1.1]");
    }

    #[test]
    fn test_arc_recorder_shares_state() {
        let recorder = Arc::new(MemoryRecorder::new());
        let shared: Arc<dyn EventRecorder> = recorder.clone();
        shared.record(ClusterEvent::normal(&ClusterRef::new("ns", "c"), "Test", "msg"));
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_event_display() {
        let event = ClusterEvent::normal(&ClusterRef::new("ns", "c"), "ExcludingProcesses", "Excluding []");
        assert_eq!(event.to_string(), "ns/c Normal ExcludingProcesses: Excluding []");
    }

    #[test]
    fn test_pair_records_to_both() {
        let first = MemoryRecorder::new();
        let second = MemoryRecorder::new();
        let pair = (first.clone(), second.clone());

        pair.record(ClusterEvent::normal(&ClusterRef::new("ns", "c"), "Test", "msg"));

        assert_eq!(first.len(), 1);
        assert_eq!(second.events(), first.events());
    }

    #[test]
    fn test_tracing_pair_keeps_memory_copy() {
        let memory = MemoryRecorder::new();
        let recorder: Arc<dyn EventRecorder> = Arc::new((TracingRecorder, memory.clone()));
        recorder.record(ClusterEvent::warning(&ClusterRef::new("ns", "c"), "Test", "msg"));
        assert_eq!(memory.events()[0].event_type, EventType::Warning);
    }
}
