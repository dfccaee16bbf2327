//! Buyer-group classification
//!
//! Generative classification when available, rule-based otherwise. Output is
//! always normalized (one membership per sampled person, sorted by person id,
//! bounded confidence) so an unchanged sample yields identical tags.

use super::criteria::BuyerCriteria;
use super::titles::{buyer_role, decision_power, inferred_title};
use crate::providers::{BuyerGroupClassifier, ClassificationContext, Slot};
use crate::types::{BuyerGroupMembership, BuyerRole, EmployeeSample, ScoringMethod};
use std::collections::HashMap;

/// Confidence when the title came from the record
const TITLED_CONFIDENCE: u8 = 80;
/// Confidence when the title had to be inferred
const INFERRED_CONFIDENCE: u8 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub memberships: Vec<BuyerGroupMembership>,
    pub method: ScoringMethod,
    pub cost: f64,
}

/// Deterministic membership for one sampled employee
pub fn classify_rule_based(sample: &EmployeeSample, criteria: &BuyerCriteria) -> BuyerGroupMembership {
    let (title, confidence) = match sample.title.as_deref() {
        Some(title) => (title.to_string(), TITLED_CONFIDENCE),
        None => (inferred_title(sample.connections).to_string(), INFERRED_CONFIDENCE),
    };

    let power = decision_power(&title, sample.department);
    let role = buyer_role(&title, power);
    let in_focus = criteria.in_focus(sample.department);
    let in_buyer_group = role != BuyerRole::Unknown && in_focus;

    let mut reasoning = format!(
        "{} in {} (decision power {:.2})",
        title,
        sample.department.as_str(),
        power
    );
    if !in_focus {
        reasoning.push_str("; department outside focus");
    }

    BuyerGroupMembership {
        person_id: sample.person_id.clone(),
        company_id: sample.company_id.clone(),
        role,
        in_buyer_group,
        confidence,
        reasoning,
    }
}

pub fn classify_all_rule_based(samples: &[EmployeeSample], criteria: &BuyerCriteria) -> Vec<BuyerGroupMembership> {
    let mut memberships: Vec<_> = samples
        .iter()
        .map(|s| classify_rule_based(s, criteria))
        .collect();
    memberships.sort_by(|a, b| a.person_id.cmp(&b.person_id));
    memberships
}

/// Reconcile generative output with the sample
///
/// Entries for unknown people are dropped, missing people get the rule-based
/// tag, duplicates keep the first entry, and the company id always comes from
/// the sample.
pub fn normalize(
    generated: Vec<BuyerGroupMembership>,
    samples: &[EmployeeSample],
    criteria: &BuyerCriteria,
) -> Vec<BuyerGroupMembership> {
    let mut by_person: HashMap<String, BuyerGroupMembership> = HashMap::new();
    for membership in generated {
        by_person.entry(membership.person_id.clone()).or_insert(membership);
    }

    let mut memberships: Vec<BuyerGroupMembership> = samples
        .iter()
        .map(|sample| match by_person.remove(&sample.person_id) {
            Some(mut m) => {
                m.company_id = sample.company_id.clone();
                m.confidence = m.confidence.min(100);
                if m.role == BuyerRole::Unknown {
                    m.in_buyer_group = false;
                }
                m.reasoning = m.reasoning.trim().to_string();
                m
            }
            None => classify_rule_based(sample, criteria),
        })
        .collect();

    memberships.sort_by(|a, b| a.person_id.cmp(&b.person_id));
    memberships.dedup_by(|a, b| a.person_id == b.person_id);
    memberships
}

pub struct MembershipClassifier {
    generative: Option<Slot<dyn BuyerGroupClassifier>>,
}

impl MembershipClassifier {
    pub fn new(generative: Option<Slot<dyn BuyerGroupClassifier>>) -> Self {
        Self { generative }
    }

    /// Classify a company's sample; never fails
    pub async fn classify(&self, samples: &[EmployeeSample], context: &ClassificationContext) -> Classification {
        if samples.is_empty() {
            return Classification {
                memberships: Vec::new(),
                method: ScoringMethod::RuleBased,
                cost: 0.0,
            };
        }

        if let Some(slot) = &self.generative {
            match slot.call(|p| p.classify_buyer_group(samples, context)).await {
                Ok(charged) => {
                    return Classification {
                        memberships: normalize(charged.value, samples, &context.criteria),
                        method: ScoringMethod::Generative,
                        cost: charged.cost,
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        company_id = %context.company_id,
                        provider = slot.id(),
                        error = %e,
                        "Generative classification unavailable, using rules"
                    );
                }
            }
        }

        Classification {
            memberships: classify_all_rule_based(samples, &context.criteria),
            method: ScoringMethod::RuleBased,
            cost: 0.0,
        }
    }
}
