//! Session events: progress notifications from the control loop.
//!
//! The loop publishes as it moves between states; front ends subscribe to
//! render progress without coupling to the loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    SessionStarted {
        session_id: String,
        directive: String,
        timestamp: DateTime<Utc>,
    },

    /// A model response arrived and was normalized.
    ModelResponded {
        session_id: String,
        response_id: Option<String>,
        text: String,
        command_count: usize,
        timestamp: DateTime<Utc>,
    },

    CommandSkipped {
        session_id: String,
        command: String,
        timestamp: DateTime<Utc>,
    },

    CommandExecuted {
        session_id: String,
        command: String,
        exit_code: i32,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A gateway call exceeded its deadline and is being retried.
    CallRetried {
        session_id: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    SessionEnded {
        session_id: String,
        outcome: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for session events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<SessionEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SessionEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
