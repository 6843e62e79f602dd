//! Domain event system — decoupled observation of agent runs.
//!
//! The agent loop publishes; audit sinks, the CLI, or a bridge client may
//! subscribe. Nothing in the loop depends on a subscriber existing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A run started streaming from a provider
    RunStarted {
        run_id: String,
        provider: String,
        mode: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A batch containing a destructive call was held for confirmation
    ConfirmationRequested {
        run_id: String,
        plan_id: String,
        steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// A held plan was approved or rejected
    PlanResolved {
        plan_id: String,
        approved: bool,
        timestamp: DateTime<Utc>,
    },

    /// A run reached a terminal state ("completed", "awaiting_confirmation",
    /// "aborted", "error")
    RunFinished {
        run_id: String,
        status: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
