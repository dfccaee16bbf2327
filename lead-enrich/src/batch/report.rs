//! End-of-batch report
//!
//! Display: "N processed (V verified, U unresolved, Q skipped for quota/cost), $X spent"

use crate::checkpoint::{CheckpointState, RecordError};
use crate::ledger::ProviderUsage;
use crate::types::{BatchKind, CostTotals, RecordStatus, ScoringMethod};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Companies listed in a buyer-group report
pub const REPORTED_COMPANIES: usize = 10;

/// One line of the buyer-group ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCompany {
    pub company_id: String,
    pub name: String,
    pub readiness_score: u8,
    pub scoring_method: ScoringMethod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub kind: BatchKind,
    /// Records eligible for this run, including resumed ones
    pub total: usize,
    /// Processed across all runs of this batch
    pub processed: usize,
    pub processed_this_run: usize,
    pub resumed: usize,
    pub verified: usize,
    pub unresolved: usize,
    pub quota_skipped: usize,
    pub cost: CostTotals,
    /// Total number of per-record errors
    pub error_count: usize,
    /// The first `max_reported_errors` of them
    pub errors: Vec<RecordError>,
    /// Churn tier distribution for this run
    pub tier_counts: BTreeMap<String, usize>,
    /// Top of the buyer-group ranking, readiness descending
    pub ranked_companies: Vec<RankedCompany>,
    pub provider_usage: BTreeMap<String, ProviderUsage>,
    pub duration_seconds: u64,
    pub cancelled: bool,
}

impl BatchReport {
    #[allow(clippy::too_many_arguments)]
    pub fn from_state(
        state: &CheckpointState,
        total: usize,
        processed_this_run: usize,
        resumed: usize,
        cost: CostTotals,
        tier_counts: BTreeMap<String, usize>,
        provider_usage: BTreeMap<String, ProviderUsage>,
        max_reported_errors: usize,
        duration_seconds: u64,
        cancelled: bool,
    ) -> Self {
        Self {
            batch_id: state.batch_id.clone(),
            kind: state.kind,
            total,
            processed: state.processed_record_ids.len(),
            processed_this_run,
            resumed,
            verified: state.count_status(RecordStatus::Verified),
            unresolved: state.count_status(RecordStatus::Unresolved),
            quota_skipped: state.count_status(RecordStatus::QuotaSkipped),
            cost,
            error_count: state.errors.len(),
            errors: state.errors.iter().take(max_reported_errors).cloned().collect(),
            tier_counts,
            ranked_companies: state
                .candidates
                .iter()
                .flatten()
                .take(REPORTED_COMPANIES)
                .map(|c| RankedCompany {
                    company_id: c.company_id.clone(),
                    name: c.firmographics.name.clone(),
                    readiness_score: c.readiness_score,
                    scoring_method: c.scoring_method,
                })
                .collect(),
            provider_usage,
            duration_seconds,
            cancelled,
        }
    }

    /// One-line summary
    pub fn display_string(&self) -> String {
        format!(
            "{} processed ({} verified, {} unresolved, {} skipped for quota/cost), ${:.2} spent",
            self.processed,
            self.verified,
            self.unresolved,
            self.quota_skipped,
            self.cost.total()
        )
    }

    /// Multi-line summary for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        let status = if self.cancelled { "cancelled" } else { "complete" };
        let _ = writeln!(out, "Batch {} ({}) {}", self.batch_id, self.kind.as_str(), status);
        let _ = writeln!(out, "  {}", self.display_string());
        let _ = writeln!(
            out,
            "  {} of {} eligible, {} resumed from checkpoint, {}s",
            self.processed_this_run, self.total, self.resumed, self.duration_seconds
        );
        let _ = writeln!(
            out,
            "  cost: search {:.2}, collect {:.2}, email {:.2}, phone {:.2}, scoring {:.2}",
            self.cost.search, self.cost.collect, self.cost.email, self.cost.phone, self.cost.scoring
        );

        if !self.tier_counts.is_empty() {
            let tiers: Vec<String> = self
                .tier_counts
                .iter()
                .map(|(tier, count)| format!("{} {}", tier, count))
                .collect();
            let _ = writeln!(out, "  churn tiers: {}", tiers.join(", "));
        }

        if !self.ranked_companies.is_empty() {
            let _ = writeln!(out, "  top companies:");
            for (rank, company) in self.ranked_companies.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "    {:>2}. {} {} readiness {} ({})",
                    rank + 1,
                    company.company_id,
                    company.name,
                    company.readiness_score,
                    company.scoring_method.as_str()
                );
            }
        }

        for (provider, usage) in &self.provider_usage {
            let _ = writeln!(out, "  {}: {} calls, {:.2}", provider, usage.calls, usage.cost);
        }

        if self.error_count > 0 {
            let _ = writeln!(out, "  errors ({} total):", self.error_count);
            for error in &self.errors {
                let _ = writeln!(out, "    {}: {}", error.record_id, error.message);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::RecordSummary;
    use crate::types::{CompanyCandidate, Firmographics};

    fn state() -> CheckpointState {
        let mut state = CheckpointState::new("b-1", BatchKind::Contacts);
        for (id, status) in [
            ("p-1", RecordStatus::Verified),
            ("p-2", RecordStatus::Verified),
            ("p-3", RecordStatus::Unresolved),
            ("p-4", RecordStatus::QuotaSkipped),
        ] {
            state.processed_record_ids.insert(id.into());
            state
                .per_record_outcome
                .insert(id.into(), RecordSummary { status, cost: 0.0 });
        }
        for i in 0..3 {
            state.errors.push(RecordError {
                record_id: format!("p-{}", i),
                message: "zerobounce: API error 500".into(),
            });
        }
        state
    }

    #[test]
    fn test_counts_and_error_truncation() {
        let cost = CostTotals {
            email: 1.25,
            phone: 0.5,
            ..Default::default()
        };
        let report = BatchReport::from_state(
            &state(),
            5,
            4,
            0,
            cost,
            BTreeMap::new(),
            BTreeMap::new(),
            2,
            3,
            false,
        );

        assert_eq!(report.verified, 2);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.quota_skipped, 1);
        assert_eq!(report.error_count, 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.display_string(),
            "4 processed (2 verified, 1 unresolved, 1 skipped for quota/cost), $1.75 spent"
        );
        assert!(report.render().contains("errors (3 total)"));
        assert!(report.ranked_companies.is_empty());
    }

    #[test]
    fn test_ranking_is_listed_in_order() {
        let mut state = CheckpointState::new("b-2", BatchKind::BuyerGroup);
        state.candidates = Some(
            (0..12u8)
                .map(|i| CompanyCandidate {
                    company_id: format!("c-{:02}", i),
                    firmographics: Firmographics {
                        name: format!("Company {}", i),
                        ..Default::default()
                    },
                    readiness_score: 90 - i,
                    scoring_method: ScoringMethod::RuleBased,
                    rationale: String::new(),
                    sampled_employees: vec![],
                })
                .collect(),
        );

        let report = BatchReport::from_state(
            &state,
            12,
            0,
            0,
            CostTotals::default(),
            BTreeMap::new(),
            BTreeMap::new(),
            5,
            0,
            false,
        );

        assert_eq!(report.ranked_companies.len(), REPORTED_COMPANIES);
        assert_eq!(report.ranked_companies[0].company_id, "c-00");
        assert_eq!(report.ranked_companies[0].readiness_score, 90);
        assert!(report.render().contains(" 1. c-00 Company 0 readiness 90 (rule-based)"));
    }
}
