//! Run lifecycle events and the EventBus
//!
//! Events are broadcast via `EventBus` and serialized for SSE transmission.
//! Every event carries the owning `user_id` so streams can be filtered per caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Workflow run lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntelEvent {
    /// Run accepted and waiting for a worker
    RunQueued {
        workflow_id: Uuid,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Worker picked up the run
    RunStarted {
        workflow_id: Uuid,
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One stage computed and persisted its rows
    StageCompleted {
        workflow_id: Uuid,
        user_id: String,
        /// Stage name (e.g. "serp", "keyword_metrics")
        stage: String,
        /// Number of rows the stage produced
        records: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Report persisted, run completed
    RunCompleted {
        workflow_id: Uuid,
        user_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Run marked failed. Carries no error detail, clients only learn that it failed.
    RunFailed {
        workflow_id: Uuid,
        user_id: String,
        is_timeout: bool,
        timestamp: DateTime<Utc>,
    },
}

impl IntelEvent {
    /// SSE event name
    pub fn event_type(&self) -> &str {
        match self {
            IntelEvent::RunQueued { .. } => "RunQueued",
            IntelEvent::RunStarted { .. } => "RunStarted",
            IntelEvent::StageCompleted { .. } => "StageCompleted",
            IntelEvent::RunCompleted { .. } => "RunCompleted",
            IntelEvent::RunFailed { .. } => "RunFailed",
        }
    }

    /// Owner of the run this event belongs to
    pub fn user_id(&self) -> &str {
        match self {
            IntelEvent::RunQueued { user_id, .. }
            | IntelEvent::RunStarted { user_id, .. }
            | IntelEvent::StageCompleted { user_id, .. }
            | IntelEvent::RunCompleted { user_id, .. }
            | IntelEvent::RunFailed { user_id, .. } => user_id,
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        match self {
            IntelEvent::RunQueued { workflow_id, .. }
            | IntelEvent::RunStarted { workflow_id, .. }
            | IntelEvent::StageCompleted { workflow_id, .. }
            | IntelEvent::RunCompleted { workflow_id, .. }
            | IntelEvent::RunFailed { workflow_id, .. } => *workflow_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally: publishing never blocks, slow subscribers
/// observe `Lagged` instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IntelEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IntelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IntelEvent,
    ) -> Result<usize, broadcast::error::SendError<IntelEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IntelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(user: &str) -> IntelEvent {
        IntelEvent::RunQueued {
            workflow_id: Uuid::new_v4(),
            user_id: user.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        assert!(bus.emit(queued("user_1")).is_err());
        // Lossy variant never panics
        bus.emit_lossy(queued("user_1"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(queued("user_42")).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "RunQueued");
        assert_eq!(event.user_id(), "user_42");
    }

    #[test]
    fn test_serialized_event_is_tagged() {
        let event = IntelEvent::RunFailed {
            workflow_id: Uuid::nil(),
            user_id: "u".to_string(),
            is_timeout: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RunFailed");
        assert_eq!(json["is_timeout"], true);
    }
}
