//! Buyer-group engine with scripted company data and model providers

mod helpers;

use async_trait::async_trait;
use helpers::*;
use lead_enrich::batch::{BuyerGroupProcessor, RecordProcessor};
use lead_enrich::buyer_group::criteria::BuyerCriteria;
use lead_enrich::buyer_group::BuyerGroupEngine;
use lead_enrich::checkpoint::{CheckpointManager, MemoryCheckpointStore};
use lead_enrich::config::ScoringConfig;
use lead_enrich::providers::{
    BuyerGroupClassifier, ClassificationContext, CompanyScorer, CompanySearch, EmployeeSource, ProviderError,
    ProviderSet,
};
use lead_enrich::sink::MemorySink;
use lead_enrich::types::{
    BatchKind, BuyerGroupMembership, BuyerRole, CostCategory, EmployeeSample, RecordStatus, ScoringMethod,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn criteria() -> BuyerCriteria {
    BuyerCriteria {
        industries: vec!["software".into()],
        min_readiness: 50,
        ..Default::default()
    }
}

fn company_data_employees() -> Vec<lead_enrich::types::EmployeeRecord> {
    vec![
        employee("e-1", "c-fit", "VP of Sales", "Sales", 800),
        employee("e-2", "c-fit", "CEO", "Executive", 1200),
        employee("e-3", "c-fit", "Software Engineer", "Engineering", 150),
        employee("e-4", "c-fit", "General Counsel", "Legal", 300),
        employee("e-9", "c-small", "Founder", "Executive", 90),
    ]
}

fn company_data() -> Arc<FakeCompanyData> {
    FakeCompanyData::new(
        vec![company("c-fit", "Computer Software", 500), company("c-small", "Retail", 5)],
        company_data_employees(),
    )
}

/// Provider set with company data and, optionally, model slots
fn providers<M>(h: &Harness, data: &Arc<FakeCompanyData>, model: Option<Arc<M>>) -> ProviderSet
where
    M: CompanyScorer + BuyerGroupClassifier + 'static,
{
    let company_guard = h.guard("coresignal");
    let mut set = ProviderSet {
        company_search: Some(h.slot_with_guard(
            company_guard.clone(),
            data.clone() as Arc<dyn CompanySearch>,
            CostCategory::Search,
            0.1,
        )),
        employee_source: Some(h.slot_with_guard(
            company_guard,
            data.clone() as Arc<dyn EmployeeSource>,
            CostCategory::Collect,
            0.05,
        )),
        ..Default::default()
    };
    if let Some(model) = model {
        let guard = h.guard("anthropic");
        set.company_scorer = Some(h.slot_with_guard(
            guard.clone(),
            model.clone() as Arc<dyn CompanyScorer>,
            CostCategory::Scoring,
            0.02,
        ));
        set.classifier = Some(h.slot_with_guard(
            guard,
            model as Arc<dyn BuyerGroupClassifier>,
            CostCategory::Scoring,
            0.03,
        ));
    }
    set
}

fn roles(memberships: &[BuyerGroupMembership]) -> Vec<(&str, BuyerRole, bool)> {
    memberships
        .iter()
        .map(|m| (m.person_id.as_str(), m.role, m.in_buyer_group))
        .collect()
}

#[tokio::test]
async fn test_rule_based_fallback_when_model_unavailable() {
    let h = Harness::new();
    let data = company_data();
    let model = UnavailableModel::new();
    let engine = BuyerGroupEngine::new(&providers(&h, &data, Some(model.clone())), ScoringConfig::default()).unwrap();

    let outcome = engine.process_company(company("c-fit", "Computer Software", 500), &criteria()).await;

    assert_eq!(outcome.candidate.scoring_method, ScoringMethod::RuleBased);
    assert!(outcome.candidate.readiness_score >= 50);
    assert!(outcome.error.is_none());
    assert_eq!(model.calls(), 2);
    assert_eq!(
        roles(&outcome.memberships),
        vec![
            ("e-1", BuyerRole::Influencer, true),
            ("e-2", BuyerRole::Decision, true),
            ("e-3", BuyerRole::Unknown, false),
            ("e-4", BuyerRole::Blocker, true),
        ]
    );
    // Failed model calls are not charged
    assert_eq!(outcome.cost.scoring, 0.0);
    assert!((outcome.cost.collect - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_classification_is_stable_across_runs() {
    let h = Harness::new();
    let data = company_data();
    let engine = BuyerGroupEngine::new(
        &providers::<UnavailableModel>(&h, &data, None),
        ScoringConfig::default(),
    )
    .unwrap();

    let first = engine.process_company(company("c-fit", "Computer Software", 500), &criteria()).await;
    let second = engine.process_company(company("c-fit", "Computer Software", 500), &criteria()).await;

    assert_eq!(first.memberships, second.memberships);
    assert_eq!(first.candidate.readiness_score, second.candidate.readiness_score);
}

#[tokio::test]
async fn test_unqualified_company_is_not_sampled() {
    let h = Harness::new();
    let data = company_data();
    let engine = BuyerGroupEngine::new(
        &providers::<UnavailableModel>(&h, &data, None),
        ScoringConfig::default(),
    )
    .unwrap();

    let outcome = engine.process_company(company("c-small", "Retail", 5), &criteria()).await;

    assert!(outcome.candidate.readiness_score < 50);
    assert!(outcome.memberships.is_empty());
    assert!(outcome.candidate.sampled_employees.is_empty());
    assert_eq!(data.employee_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_candidates_are_ranked() {
    let h = Harness::new();
    let data = company_data();
    let engine = BuyerGroupEngine::new(
        &providers::<UnavailableModel>(&h, &data, None),
        ScoringConfig::default(),
    )
    .unwrap();

    let (candidates, cost) = engine.find_candidates(&criteria()).await.unwrap();

    let ids: Vec<&str> = candidates.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["c-fit", "c-small"]);
    assert!((cost.search - 0.1).abs() < 1e-9);
    assert_eq!(data.search_calls.load(Ordering::SeqCst), 1);
}

/// Model that answers with a messy membership list
struct SloppyModel;

#[async_trait]
impl CompanyScorer for SloppyModel {
    async fn score_company(
        &self,
        _criteria: &BuyerCriteria,
        _firmographics: &lead_enrich::types::Firmographics,
    ) -> Result<lead_enrich::providers::CompanyScore, ProviderError> {
        Ok(lead_enrich::providers::CompanyScore {
            score: 88,
            rationale: "Strong hiring in revenue teams".into(),
        })
    }
}

#[async_trait]
impl BuyerGroupClassifier for SloppyModel {
    async fn classify_buyer_group(
        &self,
        _samples: &[EmployeeSample],
        _context: &ClassificationContext,
    ) -> Result<Vec<BuyerGroupMembership>, ProviderError> {
        let tag = |person: &str, company: &str, role: BuyerRole, in_group: bool| BuyerGroupMembership {
            person_id: person.into(),
            company_id: company.into(),
            role,
            in_buyer_group: in_group,
            confidence: 90,
            reasoning: "  from title  ".into(),
        };
        Ok(vec![
            tag("e-2", "wrong-company", BuyerRole::Decision, true),
            tag("e-2", "c-fit", BuyerRole::User, true),
            tag("ghost", "c-fit", BuyerRole::Decision, true),
            tag("e-3", "c-fit", BuyerRole::Unknown, true),
        ])
    }
}

#[tokio::test]
async fn test_generative_output_is_normalized() {
    let h = Harness::new();
    let data = company_data();
    let engine = BuyerGroupEngine::new(
        &providers(&h, &data, Some(Arc::new(SloppyModel))),
        ScoringConfig::default(),
    )
    .unwrap();

    let outcome = engine.process_company(company("c-fit", "Computer Software", 500), &criteria()).await;

    assert_eq!(outcome.candidate.scoring_method, ScoringMethod::Generative);
    assert_eq!(outcome.candidate.readiness_score, 88);
    assert!((outcome.cost.scoring - 0.05).abs() < 1e-9);

    let ids: Vec<&str> = outcome.memberships.iter().map(|m| m.person_id.as_str()).collect();
    assert_eq!(ids, vec!["e-1", "e-2", "e-3", "e-4"]);

    let ceo = &outcome.memberships[1];
    assert_eq!(ceo.role, BuyerRole::Decision);
    assert_eq!(ceo.company_id, "c-fit");
    assert_eq!(ceo.reasoning, "from title");
    // Unknown role never counts as a member
    assert!(!outcome.memberships[2].in_buyer_group);
    assert!(outcome.memberships.iter().all(|m| m.company_id == "c-fit"));
}

#[tokio::test]
async fn test_duplicate_search_results_are_scored_once() {
    let h = Harness::new();
    let data = FakeCompanyData::new(
        vec![
            company("c-fit", "Computer Software", 500),
            company("c-small", "Retail", 5),
            company("c-fit", "Computer Software", 500),
        ],
        vec![],
    );
    let model = UnavailableModel::new();
    let engine = BuyerGroupEngine::new(&providers(&h, &data, Some(model.clone())), ScoringConfig::default()).unwrap();

    let (candidates, _) = engine.find_candidates(&criteria()).await.unwrap();

    let ids: Vec<&str> = candidates.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["c-fit", "c-small"]);
    // One scoring attempt per distinct company
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_processor_plans_ranked_companies_then_patches() {
    let h = Harness::new();
    let data = FakeCompanyData::new(
        vec![company("c-small", "Retail", 5), company("c-fit", "Computer Software", 500)],
        company_data_employees(),
    );
    let engine = BuyerGroupEngine::new(
        &providers::<UnavailableModel>(&h, &data, None),
        ScoringConfig::default(),
    )
    .unwrap();
    let processor = BuyerGroupProcessor::new(
        engine,
        BuyerCriteria {
            max_companies: Some(1),
            ..criteria()
        },
    );
    let store = Arc::new(MemoryCheckpointStore::new());
    let mut checkpoint = CheckpointManager::load(
        store.clone(),
        Arc::new(MemorySink::new()),
        Arc::clone(&h.ledger),
        h.events.clone(),
        "bg-plan",
        BatchKind::BuyerGroup,
    )
    .await
    .unwrap();

    // Search order puts the small company first; ranking keeps the better fit
    let companies = processor.plan(&mut checkpoint).await.unwrap();
    let ids: Vec<&str> = companies.iter().map(|c| c.company_id.as_str()).collect();
    assert_eq!(ids, vec!["c-fit"]);
    assert_eq!(store.snapshot("bg-plan").unwrap().candidates.unwrap(), companies);

    let outcome = processor.process(&companies[0]).await;
    assert_eq!(outcome.status, RecordStatus::Verified);
    assert_eq!(outcome.patches.len(), 5);
    assert_eq!(outcome.patches[0].record_id, "c-fit");
    assert!(outcome.patches[0].buyer_readiness.is_some());
    assert!(outcome.patches[1..]
        .iter()
        .all(|p| p.buyer_group_membership.is_some()));
    assert!((outcome.cost.collect - 0.05).abs() < 1e-9);
}
