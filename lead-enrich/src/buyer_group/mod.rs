//! Buyer-group scorer and sampler
//!
//! Pipeline per run: search companies matching the criteria, score each for
//! readiness, and for companies at or above `min_readiness` sample employees
//! and classify them into buyer-group roles.

pub mod classifier;
pub mod criteria;
pub mod sampler;
pub mod scorer;
pub mod titles;

use crate::config::ScoringConfig;
use crate::error::{EnrichError, Result};
use crate::providers::{ClassificationContext, CompanySearch, EmployeeSource, ProviderError, ProviderSet, Slot};
use crate::types::{
    BuyerGroupMembership, CompanyCandidate, CompanyRecord, CostCategory, CostTotals, EmployeeSample,
};
use classifier::{Classification, MembershipClassifier};
use criteria::BuyerCriteria;
use scorer::{Readiness, ReadinessScorer};
use std::collections::BTreeSet;

/// Result of processing one company
#[derive(Debug, Clone)]
pub struct CompanyOutcome {
    pub candidate: CompanyCandidate,
    /// Empty when the company is below `min_readiness` or sampling failed
    pub memberships: Vec<BuyerGroupMembership>,
    pub cost: CostTotals,
    /// Employee lookup failure, if any
    pub error: Option<String>,
}

impl CompanyOutcome {
    pub fn qualified(&self, criteria: &BuyerCriteria) -> bool {
        self.candidate.readiness_score >= criteria.min_readiness
    }
}

/// Readiness descending, ties by company id
pub fn rank_candidates(candidates: &mut [CompanyCandidate]) {
    candidates.sort_by(|a, b| {
        b.readiness_score
            .cmp(&a.readiness_score)
            .then_with(|| a.company_id.cmp(&b.company_id))
    });
}

pub struct BuyerGroupEngine {
    search: Slot<dyn CompanySearch>,
    employees: Slot<dyn EmployeeSource>,
    scorer: ReadinessScorer,
    classifier: MembershipClassifier,
    config: ScoringConfig,
}

impl BuyerGroupEngine {
    /// Requires company search and employee lookup; generative slots are optional
    pub fn new(providers: &ProviderSet, config: ScoringConfig) -> Result<Self> {
        providers.ensure_buyer_group()?;
        let (Some(search), Some(employees)) = (
            providers.company_search.clone(),
            providers.employee_source.clone(),
        ) else {
            return Err(EnrichError::Config("company data provider missing".to_string()));
        };

        Ok(Self {
            search,
            employees,
            scorer: ReadinessScorer::new(providers.company_scorer.clone(), config.clone()),
            classifier: MembershipClassifier::new(providers.classifier.clone()),
            config,
        })
    }

    /// Companies matching the criteria, unscored, first occurrence of each id
    pub async fn search_companies(&self, criteria: &BuyerCriteria) -> std::result::Result<(Vec<CompanyRecord>, f64), ProviderError> {
        let query = criteria.search_query(self.config.search_limit);
        let charged = self.search.call(|p| p.search_companies(&query)).await?;

        let found = charged.value.len();
        let mut seen = BTreeSet::new();
        let companies: Vec<CompanyRecord> = charged
            .value
            .into_iter()
            .filter(|c| seen.insert(c.company_id.clone()))
            .collect();

        tracing::info!(
            companies = companies.len(),
            duplicates = found - companies.len(),
            cost = charged.cost,
            "Company search complete"
        );
        Ok((companies, charged.cost))
    }

    pub async fn score_company(&self, company: &CompanyRecord, criteria: &BuyerCriteria) -> Readiness {
        self.scorer.score(company, criteria).await
    }

    /// Search, score and rank; no employees are sampled
    pub async fn find_candidates(
        &self,
        criteria: &BuyerCriteria,
    ) -> std::result::Result<(Vec<CompanyCandidate>, CostTotals), ProviderError> {
        let mut cost = CostTotals::default();
        let (companies, search_cost) = self.search_companies(criteria).await?;
        cost.add(CostCategory::Search, search_cost);

        let mut candidates = Vec::with_capacity(companies.len());
        for company in companies {
            let readiness = self.score_company(&company, criteria).await;
            cost.add(CostCategory::Scoring, readiness.cost);
            candidates.push(candidate_from(company, readiness));
        }

        rank_candidates(&mut candidates);
        Ok((candidates, cost))
    }

    /// Fetch and sample employees of one company
    pub async fn sample_employees(
        &self,
        company_id: &str,
        criteria: &BuyerCriteria,
    ) -> std::result::Result<(Vec<EmployeeSample>, f64), ProviderError> {
        let filter = criteria.employee_filter(self.config.fetch_limit);
        let charged = self
            .employees
            .call(|p| p.fetch_employees(company_id, &filter))
            .await?;

        let samples = sampler::sample_employees(
            &charged.value,
            criteria,
            self.config.per_department_limit,
            self.config.max_sample,
        );
        Ok((samples, charged.cost))
    }

    pub async fn classify_buyer_group(
        &self,
        samples: &[EmployeeSample],
        context: &ClassificationContext,
    ) -> Classification {
        self.classifier.classify(samples, context).await
    }

    /// Score one company and, when it qualifies, sample and classify its employees
    pub async fn process_company(&self, company: CompanyRecord, criteria: &BuyerCriteria) -> CompanyOutcome {
        let readiness = self.score_company(&company, criteria).await;
        let scoring_cost = readiness.cost;

        let mut outcome = self.process_candidate(candidate_from(company, readiness), criteria).await;
        outcome.cost.add(CostCategory::Scoring, scoring_cost);
        outcome
    }

    /// Sample and classify the employees of an already scored company when it qualifies
    pub async fn process_candidate(&self, mut candidate: CompanyCandidate, criteria: &BuyerCriteria) -> CompanyOutcome {
        let mut cost = CostTotals::default();
        let mut outcome_error = None;
        let mut memberships = Vec::new();

        if candidate.readiness_score >= criteria.min_readiness {
            match self.sample_employees(&candidate.company_id, criteria).await {
                Ok((samples, collect_cost)) => {
                    cost.add(CostCategory::Collect, collect_cost);
                    let context = ClassificationContext {
                        company_id: candidate.company_id.clone(),
                        firmographics: candidate.firmographics.clone(),
                        criteria: criteria.clone(),
                    };
                    let classification = self.classify_buyer_group(&samples, &context).await;
                    cost.add(CostCategory::Scoring, classification.cost);
                    memberships = classification.memberships;
                    candidate.sampled_employees = samples;
                }
                Err(e) => {
                    tracing::warn!(
                        company_id = %candidate.company_id,
                        error = %e,
                        "Employee lookup failed"
                    );
                    outcome_error = Some(format!("employee lookup: {}", e));
                }
            }
        }

        tracing::debug!(
            company_id = %candidate.company_id,
            readiness = candidate.readiness_score,
            method = candidate.scoring_method.as_str(),
            members = memberships.iter().filter(|m| m.in_buyer_group).count(),
            "Company processed"
        );

        CompanyOutcome {
            candidate,
            memberships,
            cost,
            error: outcome_error,
        }
    }
}

fn candidate_from(company: CompanyRecord, readiness: Readiness) -> CompanyCandidate {
    CompanyCandidate {
        company_id: company.company_id,
        firmographics: company.firmographics,
        readiness_score: readiness.score,
        scoring_method: readiness.method,
        rationale: readiness.rationale,
        sampled_employees: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Firmographics, ScoringMethod};

    fn candidate(id: &str, score: u8) -> CompanyCandidate {
        CompanyCandidate {
            company_id: id.into(),
            firmographics: Firmographics::default(),
            readiness_score: score,
            scoring_method: ScoringMethod::RuleBased,
            rationale: String::new(),
            sampled_employees: vec![],
        }
    }

    #[test]
    fn test_rank_by_score_then_id() {
        let mut candidates = vec![candidate("b", 70), candidate("c", 90), candidate("a", 70)];
        rank_candidates(&mut candidates);
        let ids: Vec<&str> = candidates.iter().map(|c| c.company_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_engine_requires_company_provider() {
        let result = BuyerGroupEngine::new(&ProviderSet::default(), ScoringConfig::default());
        assert!(matches!(result, Err(EnrichError::Config(_))));
    }
}
