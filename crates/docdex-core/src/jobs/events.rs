//! The in-process event bus.
//!
//! Multi-producer / multi-consumer over a tokio broadcast channel. Slow
//! consumers lag and drop events rather than backpressuring producers, so
//! the pipeline manager can always emit without blocking. The bus is an
//! injected dependency everywhere; there is no process-global emitter.

use crate::types::{JobStatus, ProgressEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast buffer before slow consumers start lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Events visible to bus subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// A job's status changed; emitted exactly once per persisted
    /// transition.
    JobStatusChange {
        /// Job id.
        id: String,
        /// Normalized library name.
        library: String,
        /// Normalized version; `None` is unversioned.
        version: Option<String>,
        /// New status.
        status: JobStatus,
        /// Failure detail for `Failed`.
        error: Option<String>,
    },
    /// Page-granular progress for a running job.
    JobProgress {
        /// Job id.
        job_id: String,
        /// The progress payload (with `result` elided for transport).
        progress: ProgressEvent,
    },
    /// The set of indexed libraries or versions changed.
    LibraryChange,
}

/// Broadcast event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with an explicit buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emits an event to all current subscribers. Emission never blocks;
    /// with no subscribers the event is dropped.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Opens a new subscription. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(Event::LibraryChange);
        assert!(matches!(a.recv().await.unwrap(), Event::LibraryChange));
        assert!(matches!(b.recv().await.unwrap(), Event::LibraryChange));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(Event::LibraryChange);
    }

    #[test]
    fn test_event_serialization_tags() {
        let event = Event::JobStatusChange {
            id: "j1".to_string(),
            library: "lib".to_string(),
            version: None,
            status: JobStatus::Completed,
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"JOB_STATUS_CHANGE\""));
        assert!(json.contains("\"version\":null"), "null must stay explicit");
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Event::JobStatusChange { status: JobStatus::Completed, .. }));
    }
}
