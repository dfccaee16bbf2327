//! Batch events and the broadcast event bus
//!
//! Events are emitted by the batch orchestrator and provider layer. Any number of
//! observers (CLI progress printer, tests, a future push transport) can subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Enrichment engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnrichEvent {
    /// Batch run started (after checkpoint load)
    BatchStarted {
        batch_id: String,
        /// "contacts", "churn" or "buyer_group"
        kind: String,
        /// Records eligible for this run
        total: usize,
        /// Records skipped because the checkpoint already holds them
        resumed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress update
    BatchProgress {
        batch_id: String,
        processed: usize,
        total: usize,
        percentage: f32,
        /// Running cost across all categories
        cost_total: f64,
        /// Churn tier distribution ("low"/"medium"/"high"), empty for other kinds
        #[serde(default)]
        tier_counts: BTreeMap<String, usize>,
        elapsed_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// A provider was switched off for the rest of the run (auth failure)
    ProviderDisabled {
        provider: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Checkpoint snapshot persisted
    CheckpointSaved {
        batch_id: String,
        processed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch finished all eligible records
    BatchCompleted {
        batch_id: String,
        processed: usize,
        verified: usize,
        unresolved: usize,
        quota_skipped: usize,
        cost_total: f64,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Batch stopped early on cancellation
    BatchCancelled {
        batch_id: String,
        processed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch aborted on a fatal error
    BatchFailed {
        batch_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl EnrichEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            EnrichEvent::BatchStarted { .. } => "BatchStarted",
            EnrichEvent::BatchProgress { .. } => "BatchProgress",
            EnrichEvent::ProviderDisabled { .. } => "ProviderDisabled",
            EnrichEvent::CheckpointSaved { .. } => "CheckpointSaved",
            EnrichEvent::BatchCompleted { .. } => "BatchCompleted",
            EnrichEvent::BatchCancelled { .. } => "BatchCancelled",
            EnrichEvent::BatchFailed { .. } => "BatchFailed",
        }
    }
}

/// Broadcast event bus
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EnrichEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EnrichEvent,
    ) -> Result<usize, broadcast::error::SendError<EnrichEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: EnrichEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
