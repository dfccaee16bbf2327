//! Title analysis: department, seniority and decision power

use crate::types::{BuyerRole, Department, Seniority};
use once_cell::sync::Lazy;
use regex::Regex;

fn pattern(source: &str) -> Regex {
    // Patterns are compile-time constants
    Regex::new(source).unwrap_or_else(|e| panic!("invalid title pattern {}: {}", source, e))
}

/// Checked in order; the first match wins
static DEPARTMENT_PATTERNS: Lazy<Vec<(Department, Regex)>> = Lazy::new(|| {
    vec![
        (
            Department::CustomerSuccess,
            pattern(r"\b(customer success|customer experience|client success|support|cx)\b"),
        ),
        (
            Department::Sales,
            pattern(r"\b(sales|revenue|account executive|account|business development|bd|ae|sdr|bdr)\b"),
        ),
        (
            Department::Marketing,
            pattern(r"\b(marketing|growth|demand gen|content|brand|communications)\b"),
        ),
        (
            Department::Product,
            pattern(r"\b(product|pm|product manager|ux|ui|design)\b"),
        ),
        (
            Department::Engineering,
            pattern(r"\b(engineer|engineering|developer|dev|software|frontend|backend|fullstack|swe|it|security)\b"),
        ),
        (
            Department::Operations,
            pattern(r"\b(operations|ops|revops|salesops|marketingops|business operations|procurement)\b"),
        ),
        (
            Department::Finance,
            pattern(r"\b(finance|financial|accounting|fp&a|controller|cfo|treasurer)\b"),
        ),
        (
            Department::Hr,
            pattern(r"\b(hr|human resources|people|talent|recruiting|recruitment)\b"),
        ),
        (
            Department::Legal,
            pattern(r"\b(legal|counsel|compliance|regulatory)\b"),
        ),
        (
            Department::Executive,
            pattern(r"\b(ceo|cto|coo|cro|cmo|chief|president|founder|owner)\b"),
        ),
    ]
});

/// Checked in order, most senior first
static SENIORITY_PATTERNS: Lazy<Vec<(Seniority, Regex)>> = Lazy::new(|| {
    vec![
        (
            Seniority::Executive,
            pattern(r"\b(ceo|cfo|cto|coo|cro|cmo|president|vp|svp|evp|vice president|chief|founder)\b"),
        ),
        (Seniority::Director, pattern(r"\b(director|head of|senior director)\b")),
        (Seniority::Manager, pattern(r"\b(manager|lead|senior|principal)\b")),
        (Seniority::Entry, pattern(r"\b(associate|junior|intern|assistant)\b")),
        (
            Seniority::Individual,
            pattern(r"\b(engineer|developer|analyst|specialist|coordinator|representative)\b"),
        ),
    ]
});

static TOP_EXECUTIVE: Lazy<Regex> = Lazy::new(|| pattern(r"\b(ceo|cfo|cto|coo|cro|cmo|president|chief)\b"));
static VP: Lazy<Regex> = Lazy::new(|| pattern(r"\b(vp|svp|evp|vice president)\b"));
static DIRECTOR: Lazy<Regex> = Lazy::new(|| pattern(r"\b(director|head of)\b"));
static MANAGER: Lazy<Regex> = Lazy::new(|| pattern(r"\b(manager|lead)\b"));
static CHAMPION: Lazy<Regex> = Lazy::new(|| pattern(r"\b(vp|vice president|director|head of|senior)\b"));
static BLOCKER: Lazy<Regex> =
    Lazy::new(|| pattern(r"\b(legal|counsel|compliance|finance|procurement|security|privacy)\b"));

/// Department from a provider-reported department, falling back to the title
pub fn infer_department(title: Option<&str>, reported: Option<&str>) -> Department {
    for text in [reported, title].into_iter().flatten() {
        let lower = text.to_lowercase();
        if let Some((department, _)) = DEPARTMENT_PATTERNS.iter().find(|(_, re)| re.is_match(&lower)) {
            return *department;
        }
    }
    Department::Other
}

pub fn infer_seniority(title: Option<&str>) -> Seniority {
    let Some(lower) = title.map(|t| t.to_lowercase()) else {
        return Seniority::Individual;
    };
    SENIORITY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(level, _)| *level)
        .unwrap_or(Seniority::Individual)
}

/// Placeholder title for records without one, from network size
pub fn inferred_title(connections: u32) -> &'static str {
    if connections > 500 {
        "Senior Manager"
    } else if connections > 200 {
        "Manager"
    } else {
        "Individual Contributor"
    }
}

/// Title weight plus department weight, capped at 1.0
pub fn decision_power(title: &str, department: Department) -> f64 {
    let lower = title.to_lowercase();
    let title_weight = if TOP_EXECUTIVE.is_match(&lower) {
        0.4
    } else if VP.is_match(&lower) {
        0.3
    } else if DIRECTOR.is_match(&lower) {
        0.2
    } else if MANAGER.is_match(&lower) {
        0.1
    } else {
        0.0
    };

    let department_weight = match department {
        Department::Executive => 0.3,
        Department::Sales => 0.25,
        Department::Product => 0.2,
        Department::Engineering | Department::Marketing => 0.15,
        Department::Operations | Department::Finance => 0.1,
        _ => 0.05,
    };

    f64::min(title_weight + department_weight, 1.0)
}

/// Rule-based buyer role
pub fn buyer_role(title: &str, power: f64) -> BuyerRole {
    let lower = title.to_lowercase();
    if power >= 0.6 {
        BuyerRole::Decision
    } else if BLOCKER.is_match(&lower) {
        BuyerRole::Blocker
    } else if power >= 0.4 || CHAMPION.is_match(&lower) {
        BuyerRole::Influencer
    } else if power >= 0.2 {
        BuyerRole::User
    } else {
        BuyerRole::Unknown
    }
}
