//! Batch orchestrator
//!
//! Drives records through a processor with a bounded number in flight,
//! records each outcome in the checkpoint, flushes on a count or timer, and
//! emits progress events. Cancellation stops dispatching; in-flight records
//! finish and a final flush runs before returning.

pub mod report;

pub use report::BatchReport;

use crate::buyer_group::criteria::BuyerCriteria;
use crate::buyer_group::BuyerGroupEngine;
use crate::cascade::{EmailCascade, PhoneCascade};
use crate::checkpoint::CheckpointManager;
use crate::churn::{is_fresh, ChurnCalculator};
use crate::config::BatchConfig;
use crate::error::{EnrichError, Result};
use crate::ledger::CostLedger;
use crate::providers::{ProfileFetcher, ProviderError, ProviderSet, Slot};
use crate::types::{
    AttemptOutcome, BatchKind, BuyerReadiness, CompanyCandidate, ContactCandidate, CostCategory, CostTotals,
    FieldKind, FieldPatch, PersonRecord, RecordId, RecordStatus, RiskTier, VerificationResult,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use lead_common::{EnrichEvent, EventBus};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Result of processing one record
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record_id: RecordId,
    pub status: RecordStatus,
    /// Field-level write-back, possibly for several records (buyer-group)
    pub patches: Vec<FieldPatch>,
    pub cost: CostTotals,
    pub error: Option<String>,
    /// Set by the churn pipeline
    pub risk_tier: Option<RiskTier>,
}

impl RecordOutcome {
    fn new(record_id: impl Into<RecordId>, status: RecordStatus) -> Self {
        Self {
            record_id: record_id.into(),
            status,
            patches: Vec::new(),
            cost: CostTotals::default(),
            error: None,
            risk_tier: None,
        }
    }
}

/// One pipeline's per-record work
#[async_trait]
pub trait RecordProcessor: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    fn kind(&self) -> BatchKind;

    fn record_id<'a>(&self, item: &'a Self::Item) -> &'a str;

    /// Run the full sequence for one record; never fails
    async fn process(&self, item: &Self::Item) -> RecordOutcome;
}

// ============================================================================
// Contacts
// ============================================================================

pub struct ContactsProcessor {
    email: EmailCascade,
    phone: PhoneCascade,
    force: bool,
}

impl ContactsProcessor {
    pub fn new(email: EmailCascade, phone: PhoneCascade, force: bool) -> Self {
        Self { email, phone, force }
    }

    pub fn from_providers(
        providers: &ProviderSet,
        cascade: crate::config::CascadeConfig,
        force: bool,
    ) -> Result<Self> {
        providers.ensure_contacts()?;
        Ok(Self::new(
            EmailCascade::new(
                providers.email_verifiers.clone(),
                providers.email_discoverers.clone(),
                cascade.clone(),
            ),
            PhoneCascade::new(providers.phone_stages.clone(), cascade),
            force,
        ))
    }
}

/// Status for a set of verification results
fn contact_status(results: &[VerificationResult]) -> RecordStatus {
    if results.iter().any(|r| r.valid) {
        RecordStatus::Verified
    } else if results.iter().any(|r| r.limit_skipped()) {
        RecordStatus::QuotaSkipped
    } else {
        RecordStatus::Unresolved
    }
}

/// Provider failures worth reporting, e.g. "zerobounce: API error 500: ..."
fn failure_messages(results: &[VerificationResult]) -> Option<String> {
    let messages: Vec<String> = results
        .iter()
        .flat_map(|r| r.sources_attempted.iter())
        .filter(|a| a.outcome == AttemptOutcome::Failed)
        .map(|a| format!("{}: {}", a.provider_id, a.detail.as_deref().unwrap_or("failed")))
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

#[async_trait]
impl RecordProcessor for ContactsProcessor {
    type Item = PersonRecord;

    fn kind(&self) -> BatchKind {
        BatchKind::Contacts
    }

    fn record_id<'a>(&self, item: &'a PersonRecord) -> &'a str {
        &item.id
    }

    async fn process(&self, record: &PersonRecord) -> RecordOutcome {
        let (email, phone) = ContactCandidate::from_person(record);
        let mut results = Vec::with_capacity(2);

        if self.force || record.email_verified != Some(true) {
            results.push(self.email.verify(&email).await);
        }
        if self.force || record.phone_verified != Some(true) {
            results.push(self.phone.verify(&phone).await);
        }

        if results.is_empty() {
            tracing::debug!(record_id = %record.id, "Contacts already verified");
            return RecordOutcome::new(&record.id, RecordStatus::Verified);
        }

        let mut outcome = RecordOutcome::new(&record.id, contact_status(&results));
        let mut patch = FieldPatch::new(&record.id);
        for result in &results {
            patch.apply_verification(result);
            let category = match result.field_kind {
                FieldKind::Email => CostCategory::Email,
                FieldKind::Phone => CostCategory::Phone,
            };
            outcome.cost.add(category, result.cost_incurred);
        }
        outcome.patches.push(patch);
        outcome.error = failure_messages(&results);

        tracing::debug!(
            record_id = %record.id,
            status = ?outcome.status,
            cost = outcome.cost.total(),
            "Contacts processed"
        );
        outcome
    }
}

// ============================================================================
// Churn
// ============================================================================

pub struct ChurnProcessor {
    calculator: ChurnCalculator,
    profile_fetcher: Option<Slot<dyn ProfileFetcher>>,
    force: bool,
}

impl ChurnProcessor {
    pub fn new(calculator: ChurnCalculator, profile_fetcher: Option<Slot<dyn ProfileFetcher>>, force: bool) -> Self {
        Self {
            calculator,
            profile_fetcher,
            force,
        }
    }
}

#[async_trait]
impl RecordProcessor for ChurnProcessor {
    type Item = PersonRecord;

    fn kind(&self) -> BatchKind {
        BatchKind::Churn
    }

    fn record_id<'a>(&self, item: &'a PersonRecord) -> &'a str {
        &item.id
    }

    async fn process(&self, record: &PersonRecord) -> RecordOutcome {
        let now = Utc::now();

        if !self.force {
            if let Some(existing) = record.churn_prediction.as_ref().filter(|p| is_fresh(p, now)) {
                let mut outcome = RecordOutcome::new(&record.id, RecordStatus::Verified);
                outcome.risk_tier = Some(existing.risk_tier);
                return outcome;
            }
        }

        let mut cost = CostTotals::default();
        let mut fetch_error: Option<ProviderError> = None;
        let mut history = record.career_history.clone();

        let linkedin = record.linkedin_url.as_deref().filter(|u| !u.trim().is_empty());
        if let (true, Some(fetcher), Some(url)) = (history.is_empty(), &self.profile_fetcher, linkedin) {
            match fetcher.call(|p| p.fetch_profile(url)).await {
                Ok(charged) => {
                    cost.add(fetcher.category, charged.cost);
                    history = charged.value.unwrap_or_default();
                }
                Err(e) => {
                    tracing::debug!(record_id = %record.id, error = %e, "Profile fetch failed");
                    fetch_error = Some(e);
                }
            }
        }

        match self.calculator.predict_from_history(&record.id, &history, now) {
            Some(prediction) => {
                let mut outcome = RecordOutcome::new(&record.id, RecordStatus::Verified);
                outcome.risk_tier = Some(prediction.risk_tier);
                let mut patch = FieldPatch::new(&record.id);
                patch.churn_prediction = Some(prediction);
                outcome.patches.push(patch);
                outcome.cost = cost;
                outcome
            }
            None => {
                let status = match &fetch_error {
                    Some(ProviderError::QuotaExceeded | ProviderError::BudgetExhausted) => RecordStatus::QuotaSkipped,
                    _ => RecordStatus::Unresolved,
                };
                let mut outcome = RecordOutcome::new(&record.id, status);
                outcome.error = Some(match fetch_error {
                    Some(e) => format!("profile fetch: {}", e),
                    None => "no dated career history".to_string(),
                });
                outcome.cost = cost;
                outcome
            }
        }
    }
}

// ============================================================================
// Buyer group
// ============================================================================

pub struct BuyerGroupProcessor {
    engine: BuyerGroupEngine,
    criteria: BuyerCriteria,
}

impl BuyerGroupProcessor {
    pub fn new(engine: BuyerGroupEngine, criteria: BuyerCriteria) -> Self {
        Self { engine, criteria }
    }

    /// Ranked companies to process
    ///
    /// A resumed batch reuses the ranking saved in its checkpoint. Otherwise the
    /// search and scoring run once, `max_companies` keeps the top of the
    /// ranking, and the result is saved before any company is processed. A
    /// search failure is fatal for the batch.
    pub async fn plan(&self, checkpoint: &mut CheckpointManager) -> Result<Vec<CompanyCandidate>> {
        if let Some(saved) = checkpoint.candidates() {
            tracing::info!(companies = saved.len(), "Reusing ranked companies from checkpoint");
            return Ok(saved.to_vec());
        }

        let (mut candidates, cost) = self
            .engine
            .find_candidates(&self.criteria)
            .await
            .map_err(|e| EnrichError::Source(format!("company search failed: {}", e)))?;

        if let Some(max) = self.criteria.max_companies {
            candidates.truncate(max);
        }
        tracing::info!(
            companies = candidates.len(),
            qualified = candidates
                .iter()
                .filter(|c| c.readiness_score >= self.criteria.min_readiness)
                .count(),
            cost = cost.total(),
            "Companies ranked"
        );

        checkpoint.save_candidates(candidates.clone()).await?;
        Ok(candidates)
    }
}

#[async_trait]
impl RecordProcessor for BuyerGroupProcessor {
    type Item = CompanyCandidate;

    fn kind(&self) -> BatchKind {
        BatchKind::BuyerGroup
    }

    fn record_id<'a>(&self, item: &'a CompanyCandidate) -> &'a str {
        &item.company_id
    }

    async fn process(&self, company: &CompanyCandidate) -> RecordOutcome {
        let result = self.engine.process_candidate(company.clone(), &self.criteria).await;
        let qualified = result.qualified(&self.criteria);

        let status = match (&result.error, qualified) {
            (Some(_), true) => RecordStatus::Unresolved,
            _ => RecordStatus::Verified,
        };
        let mut outcome = RecordOutcome::new(&company.company_id, status);

        let mut company_patch = FieldPatch::new(&company.company_id);
        company_patch.buyer_readiness = Some(BuyerReadiness {
            score: result.candidate.readiness_score,
            method: result.candidate.scoring_method,
            rationale: result.candidate.rationale.clone(),
        });
        outcome.patches.push(company_patch);

        for membership in result.memberships {
            let mut patch = FieldPatch::new(&membership.person_id);
            patch.buyer_group_membership = Some(membership);
            outcome.patches.push(patch);
        }

        outcome.cost = result.cost;
        outcome.error = result.error;
        outcome
    }
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_id: String,
    pub workers: usize,
    pub checkpoint_every: usize,
    pub checkpoint_interval: Duration,
    pub progress_interval: Duration,
    pub max_reported_errors: usize,
}

impl BatchOptions {
    pub fn from_config(batch_id: impl Into<String>, config: &BatchConfig) -> Self {
        Self {
            batch_id: batch_id.into(),
            workers: config.workers.max(1),
            checkpoint_every: config.checkpoint_every.max(1),
            checkpoint_interval: config.checkpoint_interval(),
            progress_interval: config.progress_interval(),
            max_reported_errors: config.max_reported_errors,
        }
    }
}

pub struct BatchRunner {
    options: BatchOptions,
    checkpoint: CheckpointManager,
    ledger: Arc<CostLedger>,
    events: EventBus,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        options: BatchOptions,
        checkpoint: CheckpointManager,
        ledger: Arc<CostLedger>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            options,
            checkpoint,
            ledger,
            events,
            cancel,
        }
    }

    /// Process every item not already in the checkpoint
    pub async fn run<P: RecordProcessor>(self, processor: Arc<P>, items: Vec<P::Item>) -> Result<BatchReport> {
        let BatchRunner {
            options,
            mut checkpoint,
            ledger,
            events,
            cancel,
        } = self;

        let start_time = Instant::now();
        let kind = processor.kind();

        // One in-flight task per record id; later duplicates are dropped
        let supplied = items.len();
        let mut seen = BTreeSet::new();
        let items: Vec<P::Item> = items
            .into_iter()
            .filter(|item| seen.insert(processor.record_id(item).to_string()))
            .collect();
        if items.len() < supplied {
            tracing::warn!(
                batch_id = %options.batch_id,
                duplicates = supplied - items.len(),
                "Duplicate record ids skipped"
            );
        }

        let total = items.len();
        let pending: Vec<P::Item> = items
            .into_iter()
            .filter(|item| !checkpoint.is_processed(processor.record_id(item)))
            .collect();
        let resumed = total - pending.len();

        tracing::info!(
            batch_id = %options.batch_id,
            kind = kind.as_str(),
            total,
            resumed,
            workers = options.workers,
            "Starting batch"
        );
        events.emit_lossy(EnrichEvent::BatchStarted {
            batch_id: options.batch_id.clone(),
            kind: kind.as_str().to_string(),
            total,
            resumed,
            timestamp: Utc::now(),
        });

        let spawn_record_task = |item: P::Item, processor: Arc<P>| async move { processor.process(&item).await };

        let mut queue = pending.into_iter();
        let mut tasks = FuturesUnordered::new();
        for _ in 0..options.workers {
            if let Some(item) = queue.next() {
                tasks.push(spawn_record_task(item, Arc::clone(&processor)));
            }
        }

        let mut progress_interval = tokio::time::interval(options.progress_interval);
        progress_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut checkpoint_interval = tokio::time::interval(options.checkpoint_interval);
        checkpoint_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut processed_this_run = 0usize;
        let mut tier_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut cancelled = false;

        let loop_result: Result<()> = loop {
            if tasks.is_empty() {
                break Ok(());
            }

            tokio::select! {
                Some(outcome) = tasks.next() => {
                    processed_this_run += 1;
                    if let Some(tier) = outcome.risk_tier {
                        *tier_counts.entry(tier.as_str().to_string()).or_insert(0) += 1;
                    }
                    checkpoint.record_outcome(outcome);

                    if checkpoint.unflushed() >= options.checkpoint_every {
                        if let Err(e) = checkpoint.flush().await {
                            break Err(e);
                        }
                    }

                    if !cancelled {
                        if let Some(item) = queue.next() {
                            tasks.push(spawn_record_task(item, Arc::clone(&processor)));
                        }
                    }
                }
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    tracing::info!(
                        batch_id = %options.batch_id,
                        in_flight = tasks.len(),
                        "Cancellation requested, finishing in-flight records"
                    );
                }
                _ = progress_interval.tick() => {
                    let processed = checkpoint.state().processed_record_ids.len();
                    let percentage = if total > 0 { processed as f32 / total as f32 * 100.0 } else { 100.0 };
                    tracing::info!(
                        batch_id = %options.batch_id,
                        processed,
                        total,
                        cost = ledger.total(),
                        "Batch progress"
                    );
                    events.emit_lossy(EnrichEvent::BatchProgress {
                        batch_id: options.batch_id.clone(),
                        processed,
                        total,
                        percentage,
                        cost_total: ledger.total(),
                        tier_counts: tier_counts.clone(),
                        elapsed_seconds: start_time.elapsed().as_secs(),
                        timestamp: Utc::now(),
                    });
                }
                _ = checkpoint_interval.tick() => {
                    if checkpoint.unflushed() > 0 {
                        if let Err(e) = checkpoint.flush().await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        // Final flush runs on completion and cancellation alike
        let result = match loop_result {
            Ok(()) => checkpoint.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(batch_id = %options.batch_id, error = %e, "Batch failed");
            events.emit_lossy(EnrichEvent::BatchFailed {
                batch_id: options.batch_id.clone(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });
            return Err(e);
        }

        let report = BatchReport::from_state(
            checkpoint.state(),
            total,
            processed_this_run,
            resumed,
            ledger.totals(),
            tier_counts,
            ledger.usage_snapshot(),
            options.max_reported_errors,
            start_time.elapsed().as_secs(),
            cancelled,
        );

        if cancelled {
            tracing::info!(batch_id = %options.batch_id, processed = report.processed, "Batch cancelled");
            events.emit_lossy(EnrichEvent::BatchCancelled {
                batch_id: options.batch_id.clone(),
                processed: report.processed,
                timestamp: Utc::now(),
            });
        } else {
            tracing::info!(batch_id = %options.batch_id, "{}", report.display_string());
            events.emit_lossy(EnrichEvent::BatchCompleted {
                batch_id: options.batch_id.clone(),
                processed: report.processed,
                verified: report.verified,
                unresolved: report.unresolved,
                quota_skipped: report.quota_skipped,
                cost_total: report.cost.total(),
                duration_seconds: report.duration_seconds,
                timestamp: Utc::now(),
            });
        }

        Ok(report)
    }
}
