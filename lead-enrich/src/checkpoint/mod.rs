//! Checkpoint manager
//!
//! A checkpoint is a complete snapshot of batch progress, rewritten on every
//! flush. Write-back patches ride in the snapshot until they have been applied,
//! so a record never reaches the persistence boundary before it is durably
//! marked processed.

pub mod file;
pub mod sqlite;

pub use file::FileCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::batch::RecordOutcome;
use crate::error::{EnrichError, Result};
use crate::ledger::CostLedger;
use crate::sink::PatchSink;
use crate::types::{BatchKind, CompanyCandidate, CostTotals, FieldPatch, RecordId, RecordStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lead_common::{EnrichEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Per-record entry kept in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub status: RecordStatus,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    pub record_id: RecordId,
    pub message: String,
}

/// Durable snapshot of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    pub batch_id: String,
    pub kind: BatchKind,
    pub processed_record_ids: BTreeSet<RecordId>,
    #[serde(default)]
    pub per_record_outcome: BTreeMap<RecordId, RecordSummary>,
    pub cumulative_cost: CostTotals,
    #[serde(default)]
    pub errors: Vec<RecordError>,
    /// Patches not yet confirmed applied by the sink
    #[serde(default)]
    pub pending_patches: Vec<FieldPatch>,
    /// Ranked companies of a buyer-group batch, fixed by its first run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CompanyCandidate>>,
    pub started_at: DateTime<Utc>,
    pub last_saved_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(batch_id: impl Into<String>, kind: BatchKind) -> Self {
        let now = Utc::now();
        Self {
            batch_id: batch_id.into(),
            kind,
            processed_record_ids: BTreeSet::new(),
            per_record_outcome: BTreeMap::new(),
            cumulative_cost: CostTotals::default(),
            errors: Vec::new(),
            pending_patches: Vec::new(),
            candidates: None,
            started_at: now,
            last_saved_at: now,
        }
    }

    pub fn is_processed(&self, record_id: &str) -> bool {
        self.processed_record_ids.contains(record_id)
    }

    /// Number of processed records with the given status
    pub fn count_status(&self, status: RecordStatus) -> usize {
        self.per_record_outcome
            .values()
            .filter(|summary| summary.status == status)
            .count()
    }
}

/// Durable checkpoint storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, batch_id: &str) -> lead_common::Result<Option<CheckpointState>>;

    /// Replace the stored snapshot for `state.batch_id`
    async fn save(&self, state: &CheckpointState) -> lead_common::Result<()>;
}

/// In-process store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, CheckpointState>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self, batch_id: &str) -> Option<CheckpointState> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(batch_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, batch_id: &str) -> lead_common::Result<Option<CheckpointState>> {
        Ok(self.snapshot(batch_id))
    }

    async fn save(&self, state: &CheckpointState) -> lead_common::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(lead_common::Error::Io(std::io::Error::other("checkpoint store unavailable")));
        }
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(state.batch_id.clone(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Tracks progress for one batch and persists it
///
/// Owned by the batch loop; workers never touch it directly.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn PatchSink>,
    ledger: Arc<CostLedger>,
    events: EventBus,
    state: CheckpointState,
    unflushed: usize,
    resumed: bool,
}

impl CheckpointManager {
    /// Load the snapshot for `batch_id`, or start a fresh one
    ///
    /// A resumed snapshot seeds the ledger with its cumulative cost and
    /// re-applies any patches that were not confirmed applied.
    pub async fn load(
        store: Arc<dyn CheckpointStore>,
        sink: Arc<dyn PatchSink>,
        ledger: Arc<CostLedger>,
        events: EventBus,
        batch_id: &str,
        kind: BatchKind,
    ) -> Result<Self> {
        let existing = store.load(batch_id).await?;

        let (state, resumed) = match existing {
            Some(state) => {
                if state.kind != kind {
                    return Err(EnrichError::Config(format!(
                        "batch '{}' is a {} batch, not {}",
                        batch_id,
                        state.kind.as_str(),
                        kind.as_str()
                    )));
                }
                tracing::info!(
                    batch_id,
                    processed = state.processed_record_ids.len(),
                    pending_patches = state.pending_patches.len(),
                    cost = state.cumulative_cost.total(),
                    "Resuming from checkpoint"
                );
                ledger.seed(state.cumulative_cost);
                (state, true)
            }
            None => (CheckpointState::new(batch_id, kind), false),
        };

        let mut manager = Self {
            store,
            sink,
            ledger,
            events,
            state,
            unflushed: 0,
            resumed,
        };
        manager.apply_pending().await;
        Ok(manager)
    }

    /// Records already processed by an earlier run of this batch
    pub fn resume_set(&self) -> &BTreeSet<RecordId> {
        &self.state.processed_record_ids
    }

    pub fn is_processed(&self, record_id: &str) -> bool {
        self.state.is_processed(record_id)
    }

    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Ranking saved by an earlier run of this batch
    pub fn candidates(&self) -> Option<&[CompanyCandidate]> {
        self.state.candidates.as_deref()
    }

    /// Store the ranking and persist it before any company is processed
    pub async fn save_candidates(&mut self, candidates: Vec<CompanyCandidate>) -> Result<()> {
        self.state.candidates = Some(candidates);
        self.flush().await
    }

    /// Outcomes recorded since the last flush
    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    /// Mark a record processed and queue its patches
    pub fn record_outcome(&mut self, outcome: RecordOutcome) {
        let RecordOutcome {
            record_id,
            status,
            patches,
            cost,
            error,
            ..
        } = outcome;

        if let Some(message) = error {
            self.state.errors.push(RecordError {
                record_id: record_id.clone(),
                message,
            });
        }
        self.state
            .pending_patches
            .extend(patches.into_iter().filter(|p| !p.is_empty()));
        self.state.per_record_outcome.insert(
            record_id.clone(),
            RecordSummary {
                status,
                cost: cost.total(),
            },
        );
        self.state.processed_record_ids.insert(record_id);
        self.unflushed += 1;
    }

    /// Persist the snapshot, then hand pending patches to the sink
    ///
    /// A save failure is fatal for the batch. A sink failure keeps the patches
    /// pending for the next flush.
    pub async fn flush(&mut self) -> Result<()> {
        self.state.cumulative_cost = self.ledger.totals();
        self.state.last_saved_at = Utc::now();

        self.store
            .save(&self.state)
            .await
            .map_err(|e| EnrichError::CheckpointWrite(e.to_string()))?;

        tracing::debug!(
            batch_id = %self.state.batch_id,
            processed = self.state.processed_record_ids.len(),
            pending_patches = self.state.pending_patches.len(),
            "Checkpoint saved"
        );
        self.events.emit_lossy(EnrichEvent::CheckpointSaved {
            batch_id: self.state.batch_id.clone(),
            processed: self.state.processed_record_ids.len(),
            timestamp: self.state.last_saved_at,
        });

        self.unflushed = 0;
        self.apply_pending().await;
        Ok(())
    }

    async fn apply_pending(&mut self) {
        if self.state.pending_patches.is_empty() {
            return;
        }

        match self.sink.apply(&self.state.pending_patches).await {
            Ok(()) => {
                tracing::debug!(
                    batch_id = %self.state.batch_id,
                    patches = self.state.pending_patches.len(),
                    "Patches applied"
                );
                self.state.pending_patches.clear();
            }
            Err(e) => {
                tracing::error!(
                    batch_id = %self.state.batch_id,
                    patches = self.state.pending_patches.len(),
                    error = %e,
                    "Write-back failed, patches kept for the next flush"
                );
            }
        }
    }

    pub fn into_state(self) -> CheckpointState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::types::CostCategory;

    fn outcome(id: &str, status: RecordStatus, patch: bool) -> RecordOutcome {
        let mut patches = Vec::new();
        if patch {
            let mut p = FieldPatch::new(id);
            p.email_verified = Some(true);
            patches.push(p);
        }
        let mut cost = CostTotals::default();
        cost.add(CostCategory::Email, 0.01);
        RecordOutcome {
            record_id: id.into(),
            status,
            patches,
            cost,
            error: None,
            risk_tier: None,
        }
    }

    async fn manager(
        store: Arc<MemoryCheckpointStore>,
        sink: Arc<MemorySink>,
        ledger: Arc<CostLedger>,
    ) -> CheckpointManager {
        CheckpointManager::load(store, sink, ledger, EventBus::default(), "b-1", BatchKind::Contacts)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_flush_saves_then_applies() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let sink = Arc::new(MemorySink::new());
        let ledger = Arc::new(CostLedger::new(None));
        let mut mgr = manager(store.clone(), sink.clone(), ledger.clone()).await;

        mgr.record_outcome(outcome("p-1", RecordStatus::Verified, true));
        mgr.record_outcome(outcome("p-2", RecordStatus::Unresolved, false));
        assert_eq!(mgr.unflushed(), 2);
        assert!(sink.fields("p-1").is_none());

        ledger.record_charge("zerobounce", CostCategory::Email, 0.02);
        mgr.flush().await.unwrap();

        let saved = store.snapshot("b-1").unwrap();
        assert_eq!(saved.processed_record_ids.len(), 2);
        assert_eq!(saved.pending_patches.len(), 1);
        assert!((saved.cumulative_cost.email - 0.02).abs() < 1e-9);
        assert_eq!(sink.fields("p-1").unwrap()["emailVerified"], true);
        assert!(mgr.state().pending_patches.is_empty());
        assert_eq!(mgr.unflushed(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_fatal() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut mgr = manager(store.clone(), sink.clone(), Arc::new(CostLedger::new(None))).await;

        mgr.record_outcome(outcome("p-1", RecordStatus::Verified, true));
        store.set_failing(true);

        let result = mgr.flush().await;
        assert!(matches!(result, Err(EnrichError::CheckpointWrite(_))));
        assert!(sink.fields("p-1").is_none());
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_patches_pending() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut mgr = manager(store.clone(), sink.clone(), Arc::new(CostLedger::new(None))).await;

        mgr.record_outcome(outcome("p-1", RecordStatus::Verified, true));
        sink.set_failing(true);
        mgr.flush().await.unwrap();
        assert_eq!(mgr.state().pending_patches.len(), 1);

        sink.set_failing(false);
        mgr.flush().await.unwrap();
        assert!(mgr.state().pending_patches.is_empty());
        assert!(sink.fields("p-1").is_some());
    }

    #[tokio::test]
    async fn test_resume_seeds_ledger_and_reapplies() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut state = CheckpointState::new("b-1", BatchKind::Contacts);
        state.processed_record_ids.insert("p-1".into());
        state.cumulative_cost.phone = 1.5;
        let mut patch = FieldPatch::new("p-1");
        patch.phone_verified = Some(true);
        state.pending_patches.push(patch);
        store.save(&state).await.unwrap();

        let sink = Arc::new(MemorySink::new());
        let ledger = Arc::new(CostLedger::new(None));
        let mgr = manager(store, sink.clone(), ledger.clone()).await;

        assert!(mgr.was_resumed());
        assert!(mgr.is_processed("p-1"));
        assert!((ledger.total() - 1.5).abs() < 1e-9);
        assert_eq!(sink.fields("p-1").unwrap()["phoneVerified"], true);
    }

    #[tokio::test]
    async fn test_resume_keeps_charges_made_before_load() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut state = CheckpointState::new("b-1", BatchKind::Contacts);
        state.cumulative_cost.search = 1.0;
        store.save(&state).await.unwrap();

        let ledger = Arc::new(CostLedger::new(None));
        ledger.record_charge("coresignal", CostCategory::Search, 0.2);
        let mut mgr = manager(store.clone(), Arc::new(MemorySink::new()), ledger.clone()).await;

        assert!((ledger.total() - 1.2).abs() < 1e-9);
        mgr.flush().await.unwrap();
        assert!((store.snapshot("b-1").unwrap().cumulative_cost.search - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected() {
        let store = Arc::new(MemoryCheckpointStore::new());
        store.save(&CheckpointState::new("b-1", BatchKind::Churn)).await.unwrap();

        let result = CheckpointManager::load(
            store,
            Arc::new(MemorySink::new()),
            Arc::new(CostLedger::new(None)),
            EventBus::default(),
            "b-1",
            BatchKind::Contacts,
        )
        .await;
        assert!(matches!(result, Err(EnrichError::Config(_))));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = CheckpointState::new("b-9", BatchKind::BuyerGroup);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["batchId"], "b-9");
        assert_eq!(json["kind"], "buyer_group");
        assert!(json["processedRecordIds"].as_array().unwrap().is_empty());
        assert!(json.get("cumulativeCost").is_some());
        assert!(json.get("lastSavedAt").is_some());
    }
}
