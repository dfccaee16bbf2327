//! Company readiness scoring
//!
//! The generative scorer is preferred. When it is not configured, disabled, over
//! budget, or returns an error, the deterministic rule-based scorer produces a
//! score on the same 0-100 scale.

use super::criteria::BuyerCriteria;
use crate::config::ScoringConfig;
use crate::providers::{CompanyScorer, Slot};
use crate::types::{CompanyRecord, Firmographics, ScoringMethod};

/// Readiness of one company and what it cost to compute
#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub score: u8,
    pub method: ScoringMethod,
    pub rationale: String,
    pub cost: f64,
}

/// Weighted size fit, industry fit, growth signal and hiring signal
pub fn rule_based_score(
    criteria: &BuyerCriteria,
    firmographics: &Firmographics,
    config: &ScoringConfig,
) -> (u8, String) {
    let band = criteria.effective_band();
    let mut notes = Vec::new();

    let size_fit = match firmographics.employee_count {
        Some(n) if band.contains(n) => {
            notes.push(format!("{} employees in target band", n));
            1.0
        }
        Some(n) if band.is_near(n) => {
            notes.push(format!("{} employees near target band", n));
            0.5
        }
        Some(n) => {
            notes.push(format!("{} employees outside target band", n));
            0.0
        }
        None => {
            notes.push("headcount unknown".to_string());
            0.0
        }
    };

    let industry_fit = if criteria.industry_matches(firmographics.industry.as_deref()) {
        if !criteria.industries.is_empty() {
            notes.push("industry match".to_string());
        }
        1.0
    } else {
        0.0
    };

    let growth = firmographics.headcount_growth_pct.unwrap_or(0.0);
    let growth_signal = if growth >= 20.0 {
        1.0
    } else if growth >= 5.0 {
        0.5
    } else if growth > 0.0 {
        0.25
    } else {
        0.0
    };
    if growth > 0.0 {
        notes.push(format!("headcount +{:.0}%", growth));
    }

    let jobs = firmographics.open_jobs.unwrap_or(0);
    let hiring_signal = match jobs {
        j if j >= 10 => 1.0,
        j if j >= 3 => 0.5,
        j if j >= 1 => 0.25,
        _ => 0.0,
    };
    if jobs > 0 {
        notes.push(format!("{} open roles", jobs));
    }

    let weight_sum = config.size_weight + config.industry_weight + config.growth_weight + config.hiring_weight;
    let raw = size_fit * config.size_weight
        + industry_fit * config.industry_weight
        + growth_signal * config.growth_weight
        + hiring_signal * config.hiring_weight;
    // Weights need not sum to 100
    let normalized = if weight_sum > 0.0 { raw * 100.0 / weight_sum } else { 0.0 };

    (normalized.round().clamp(0.0, 100.0) as u8, notes.join("; "))
}

pub struct ReadinessScorer {
    generative: Option<Slot<dyn CompanyScorer>>,
    config: ScoringConfig,
}

impl ReadinessScorer {
    pub fn new(generative: Option<Slot<dyn CompanyScorer>>, config: ScoringConfig) -> Self {
        Self { generative, config }
    }

    /// Score one company; never fails
    pub async fn score(&self, company: &CompanyRecord, criteria: &BuyerCriteria) -> Readiness {
        if let Some(slot) = &self.generative {
            let firmographics = &company.firmographics;
            match slot.call(|p| p.score_company(criteria, firmographics)).await {
                Ok(charged) => {
                    return Readiness {
                        score: charged.value.score.min(100),
                        method: ScoringMethod::Generative,
                        rationale: charged.value.rationale,
                        cost: charged.cost,
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        company_id = %company.company_id,
                        provider = slot.id(),
                        error = %e,
                        "Generative scoring unavailable, using rule-based score"
                    );
                }
            }
        }

        let (score, rationale) = rule_based_score(criteria, &company.firmographics, &self.config);
        Readiness {
            score,
            method: ScoringMethod::RuleBased,
            rationale,
            cost: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buyer_group::criteria::DealSize;

    fn firmographics(employees: u32, growth: f64, jobs: u32, industry: &str) -> Firmographics {
        Firmographics {
            name: "Acme".into(),
            industry: Some(industry.into()),
            employee_count: Some(employees),
            headcount_growth_pct: Some(growth),
            open_jobs: Some(jobs),
            ..Default::default()
        }
    }

    fn criteria() -> BuyerCriteria {
        BuyerCriteria {
            industries: vec!["software".into()],
            deal_size: DealSize::MidMarket,
            ..Default::default()
        }
    }

    #[test]
    fn test_perfect_fit_scores_100() {
        let (score, _) = rule_based_score(&criteria(), &firmographics(500, 25.0, 12, "Software"), &ScoringConfig::default());
        assert_eq!(score, 100);
    }

    #[test]
    fn test_partial_signals() {
        // near band (half of 35), industry (30), growth >=5 (half of 20), hiring >=1 (quarter of 15)
        let (score, rationale) =
            rule_based_score(&criteria(), &firmographics(150, 8.0, 2, "Software"), &ScoringConfig::default());
        assert_eq!(score, 61);
        assert!(rationale.contains("near target band"));
    }

    #[test]
    fn test_no_signals_scores_zero() {
        let (score, _) = rule_based_score(&criteria(), &firmographics(5, -3.0, 0, "Retail"), &ScoringConfig::default());
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn test_without_generative_uses_rules() {
        let scorer = ReadinessScorer::new(None, ScoringConfig::default());
        let company = CompanyRecord {
            company_id: "c-1".into(),
            firmographics: firmographics(500, 0.0, 0, "Software"),
        };

        let readiness = scorer.score(&company, &criteria()).await;
        assert_eq!(readiness.method, ScoringMethod::RuleBased);
        assert_eq!(readiness.score, 65);
        assert_eq!(readiness.cost, 0.0);
    }
}
