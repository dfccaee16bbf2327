//! Qualification criteria and the provider queries derived from them

use crate::error::{EnrichError, Result};
use crate::types::Department;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target deal size, which sets the default company size band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DealSize {
    Small,
    #[default]
    MidMarket,
    Enterprise,
}

impl DealSize {
    pub fn default_band(&self) -> SizeBand {
        match self {
            DealSize::Small => SizeBand { min: 10, max: Some(200) },
            DealSize::MidMarket => SizeBand { min: 200, max: Some(1000) },
            DealSize::Enterprise => SizeBand { min: 1000, max: None },
        }
    }
}

/// Employee-count range, open-ended when `max` is `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBand {
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

impl SizeBand {
    pub fn contains(&self, employees: u32) -> bool {
        employees >= self.min && self.max.map_or(true, |max| employees <= max)
    }

    /// Outside the band but within a factor of two of it
    pub fn is_near(&self, employees: u32) -> bool {
        !self.contains(employees)
            && employees.saturating_mul(2) >= self.min
            && self.max.map_or(true, |max| employees <= max.saturating_mul(2))
    }
}

/// Company search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub industries: Vec<String>,
    pub min_employees: Option<u32>,
    pub max_employees: Option<u32>,
    pub countries: Vec<String>,
    pub limit: usize,
}

/// Employee lookup filter for one company
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeFilter {
    pub departments: Vec<Department>,
    pub excluded_departments: Vec<Department>,
    pub limit: usize,
}

/// Buyer-group qualification criteria, usually loaded from `--criteria <toml>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuyerCriteria {
    pub industries: Vec<String>,
    /// Explicit size band; derived from `deal_size` when absent
    pub size_band: Option<SizeBand>,
    pub deal_size: DealSize,
    pub department_focus: Vec<Department>,
    pub excluded_departments: Vec<Department>,
    pub countries: Vec<String>,
    /// Companies below this readiness are not sampled
    pub min_readiness: u8,
    /// Top-ranked companies to process; all ranked companies when absent
    pub max_companies: Option<usize>,
    /// What is being sold, passed to the generative scorer
    pub product_context: Option<String>,
}

impl Default for BuyerCriteria {
    fn default() -> Self {
        Self {
            industries: Vec::new(),
            size_band: None,
            deal_size: DealSize::default(),
            department_focus: Vec::new(),
            excluded_departments: Vec::new(),
            countries: Vec::new(),
            min_readiness: 50,
            max_companies: None,
            product_context: None,
        }
    }
}

impl BuyerCriteria {
    pub fn load(path: &Path) -> Result<Self> {
        let criteria: BuyerCriteria = lead_common::config::load_toml_file(path)?;
        if criteria.min_readiness > 100 {
            return Err(EnrichError::Config("min_readiness must be within 0-100".into()));
        }
        Ok(criteria)
    }

    pub fn effective_band(&self) -> SizeBand {
        self.size_band.unwrap_or_else(|| self.deal_size.default_band())
    }

    pub fn search_query(&self, default_limit: usize) -> SearchQuery {
        let band = self.effective_band();
        SearchQuery {
            industries: self.industries.clone(),
            min_employees: Some(band.min),
            max_employees: band.max,
            countries: self.countries.clone(),
            // Ranking happens after search, so never fetch fewer than are kept
            limit: default_limit.max(self.max_companies.unwrap_or(0)),
        }
    }

    pub fn employee_filter(&self, limit: usize) -> EmployeeFilter {
        EmployeeFilter {
            departments: self.department_focus.clone(),
            excluded_departments: self.excluded_departments.clone(),
            limit,
        }
    }

    /// Per-department sample limit, doubled for enterprise deals
    pub fn per_department_limit(&self, base: usize) -> usize {
        match self.deal_size {
            DealSize::Enterprise => base * 2,
            _ => base,
        }
    }

    /// Case-insensitive match in either direction ("Software" vs "Computer Software")
    pub fn industry_matches(&self, industry: Option<&str>) -> bool {
        if self.industries.is_empty() {
            return true;
        }
        let Some(industry) = industry.map(|i| i.to_lowercase()) else {
            return false;
        };
        self.industries.iter().any(|wanted| {
            let wanted = wanted.to_lowercase();
            industry.contains(&wanted) || wanted.contains(&industry)
        })
    }

    /// No focus configured means every department is relevant
    pub fn in_focus(&self, department: Department) -> bool {
        !self.excluded_departments.contains(&department)
            && (self.department_focus.is_empty() || self.department_focus.contains(&department))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_size_bands() {
        assert_eq!(DealSize::Small.default_band(), SizeBand { min: 10, max: Some(200) });
        assert!(DealSize::Enterprise.default_band().contains(50_000));
    }

    #[test]
    fn test_near_band() {
        let band = SizeBand { min: 200, max: Some(1000) };
        assert!(band.contains(500));
        assert!(!band.is_near(500));
        assert!(band.is_near(150));
        assert!(band.is_near(1800));
        assert!(!band.is_near(50));
        assert!(!band.is_near(2500));
    }

    #[test]
    fn test_criteria_from_toml() {
        let criteria: BuyerCriteria = toml::from_str(
            r#"
            industries = ["Software"]
            deal_size = "enterprise"
            department_focus = ["sales", "operations"]
            excluded_departments = ["hr"]
            "#,
        )
        .unwrap();

        let query = criteria.search_query(25);
        assert_eq!(query.min_employees, Some(1000));
        assert_eq!(query.max_employees, None);
        assert_eq!(query.limit, 25);

        let capped = BuyerCriteria {
            max_companies: Some(40),
            ..criteria.clone()
        };
        assert_eq!(capped.search_query(25).limit, 40);
        assert_eq!(capped.search_query(100).limit, 100);
        assert_eq!(criteria.per_department_limit(3), 6);
        assert!(criteria.in_focus(Department::Sales));
        assert!(!criteria.in_focus(Department::Hr));
        assert!(!criteria.in_focus(Department::Engineering));
        assert_eq!(criteria.min_readiness, 50);
    }

    #[test]
    fn test_industry_matching() {
        let criteria = BuyerCriteria {
            industries: vec!["software".into()],
            ..Default::default()
        };
        assert!(criteria.industry_matches(Some("Computer Software")));
        assert!(!criteria.industry_matches(Some("Retail")));
        assert!(!criteria.industry_matches(None));
        assert!(BuyerCriteria::default().industry_matches(None));
    }
}
