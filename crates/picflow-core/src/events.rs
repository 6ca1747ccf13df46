//! Process-wide event channel.
//!
//! The orchestrator and handlers publish [`RunEvent`]s on a broadcast channel.
//! Delivery is fire-and-forget: publishing never blocks, and an event sent
//! while nobody is subscribed is dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::Artifact;

/// Default broadcast buffer; slow subscribers past this lag and skip events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Progress checkpoints emitted by the orchestrator.
pub mod progress {
    pub const BEFORE_TRANSFORM: i32 = 0;
    pub const TRANSFORM: i32 = 30;
    pub const BEFORE_UPLOAD: i32 = 60;
    pub const AFTER_UPLOAD: i32 = 100;
    pub const FAILED: i32 = -1;
}

/// What happened.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EventKind {
    /// Progress checkpoint: 0, 30, 60, 100, or -1 on failure
    Progress { value: i32 },
    /// Pre-transform hooks are about to run
    BeforeTransform,
    /// Pre-upload hooks are about to run
    BeforeUpload,
    /// Post-upload hooks are about to run
    AfterUpload,
    /// The run completed
    Finished {
        summary: String,
        output: Vec<Artifact>,
    },
    /// The run failed
    Failed { error: String },
    /// User-facing notification
    Notification { title: String, body: String },
    /// Non-fatal warning, e.g. a handler fallback
    Warning { message: String },
}

/// An event tagged with the run that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Broadcast publisher shared by all runs of one environment.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, run_id: Uuid, kind: EventKind) {
        tracing::trace!(%run_id, ?kind, "event");
        let _ = self.sender.send(RunEvent { run_id, kind });
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(Uuid::new_v4(), EventKind::Progress { value: 0 });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        bus.emit(run_id, EventKind::Progress { value: 0 });
        bus.emit(run_id, EventKind::BeforeTransform);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.run_id, run_id);
        assert!(matches!(first.kind, EventKind::Progress { value: 0 }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.kind, EventKind::BeforeTransform));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = RunEvent {
            run_id: Uuid::nil(),
            kind: EventKind::Progress { value: 60 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["value"], 60);
    }
}
