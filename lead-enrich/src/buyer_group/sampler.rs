//! Employee sampling
//!
//! Keeps a bounded number of employees per relevant department, most senior
//! first, then best connected, then by id so the sample is stable across runs.

use super::criteria::BuyerCriteria;
use super::titles::{infer_department, infer_seniority};
use crate::types::{Department, EmployeeRecord, EmployeeSample};
use std::collections::{HashMap, HashSet};

/// Sample employees for buyer-group classification
///
/// # Arguments
/// * `employees` - Raw provider records for one company
/// * `per_department` - Base per-department limit (doubled for enterprise deals)
/// * `max_total` - Overall cap
pub fn sample_employees(
    employees: &[EmployeeRecord],
    criteria: &BuyerCriteria,
    per_department: usize,
    max_total: usize,
) -> Vec<EmployeeSample> {
    let mut candidates: Vec<EmployeeSample> = employees
        .iter()
        .filter(|e| !e.person_id.is_empty())
        .map(|e| EmployeeSample {
            person_id: e.person_id.clone(),
            company_id: e.company_id.clone(),
            full_name: e.full_name.clone(),
            title: e.title.clone().filter(|t| !t.trim().is_empty()),
            department: infer_department(e.title.as_deref(), e.department.as_deref()),
            seniority: infer_seniority(e.title.as_deref()),
            connections: e.connections.unwrap_or(0),
        })
        .filter(|s| criteria.in_focus(s.department))
        .collect();

    candidates.sort_by(|a, b| {
        a.seniority
            .cmp(&b.seniority)
            .then(b.connections.cmp(&a.connections))
            .then(a.person_id.cmp(&b.person_id))
    });

    let limit = criteria.per_department_limit(per_department);
    let mut taken: HashMap<Department, usize> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut sample = Vec::new();

    for candidate in candidates {
        if sample.len() >= max_total {
            break;
        }
        let count = taken.entry(candidate.department).or_insert(0);
        if *count >= limit || !seen.insert(candidate.person_id.clone()) {
            continue;
        }
        *count += 1;
        sample.push(candidate);
    }

    sample
}
