//! Test helpers for lead-enrich integration tests
//!
//! Scripted providers with call counters, and guard/slot builders that skip
//! the production wiring.

#![allow(dead_code)]

pub mod mock_vendor;

use async_trait::async_trait;
use lead_common::EventBus;
use lead_enrich::buyer_group::criteria::{BuyerCriteria, EmployeeFilter, SearchQuery};
use lead_enrich::config::CascadeConfig;
use lead_enrich::ledger::CostLedger;
use lead_enrich::providers::{
    BuyerGroupClassifier, ClassificationContext, CompanyScore, CompanyScorer, CompanySearch, Discovered,
    EmailDiscoverer, EmailStatus, EmailVerdict, EmailVerifier, EmployeeSource, PhoneDiscoverer, PhoneVerdict,
    PhoneVerifier, ProfileFetcher, ProviderError, ProviderGuard, RetryPolicy, Slot,
};
use lead_enrich::types::{
    BuyerGroupMembership, CompanyRecord, CostCategory, EmployeeRecord, EmployeeSample, Firmographics,
    PersonRecord, RoleSpan,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cascade settings with pacing disabled
pub fn fast_cascade_config() -> CascadeConfig {
    CascadeConfig {
        phone_call_delay_ms: 0,
        ..Default::default()
    }
}

/// Shared ledger and event bus for building guarded slots
pub struct Harness {
    pub ledger: Arc<CostLedger>,
    pub events: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_budget(None)
    }

    pub fn with_budget(budget: Option<f64>) -> Self {
        Self {
            ledger: Arc::new(CostLedger::new(budget)),
            events: EventBus::new(64),
        }
    }

    pub fn guard(&self, id: &str) -> Arc<ProviderGuard> {
        self.guard_with(id, Duration::from_secs(2), None)
    }

    pub fn guard_with(&self, id: &str, timeout: Duration, daily_quota: Option<u32>) -> Arc<ProviderGuard> {
        let retry = RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        Arc::new(
            ProviderGuard::new(id, Arc::clone(&self.ledger), self.events.clone(), 1000, timeout, retry)
                .with_quota(daily_quota, 0),
        )
    }

    pub fn slot<T: ?Sized>(&self, id: &str, provider: Arc<T>, category: CostCategory, cost: f64) -> Slot<T> {
        Slot::new(provider, self.guard(id), category, cost)
    }

    pub fn slot_with_guard<T: ?Sized>(
        &self,
        guard: Arc<ProviderGuard>,
        provider: Arc<T>,
        category: CostCategory,
        cost: f64,
    ) -> Slot<T> {
        Slot::new(provider, guard, category, cost)
    }
}

// ============================================================================
// Scripted providers
// ============================================================================

pub struct FakeEmailVerifier {
    result: Result<EmailVerdict, ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmailVerifier {
    pub fn answering(status: EmailStatus, confidence: u8) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(EmailVerdict {
                status,
                confidence,
                details: None,
            }),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(err),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers `Valid` after `delay`
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(EmailVerdict {
                status: EmailStatus::Valid,
                confidence: 99,
                details: None,
            }),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailVerifier for FakeEmailVerifier {
    async fn verify_email(
        &self,
        _email: &str,
        _name: Option<&str>,
        _domain: Option<&str>,
    ) -> Result<EmailVerdict, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

pub struct FakeEmailDiscoverer {
    found: Option<Discovered>,
    calls: AtomicUsize,
}

impl FakeEmailDiscoverer {
    pub fn finding(email: Option<&str>, confidence: Option<u8>) -> Arc<Self> {
        Arc::new(Self {
            found: email.map(|value| Discovered {
                value: value.to_string(),
                confidence,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailDiscoverer for FakeEmailDiscoverer {
    async fn discover_email(&self, _name: &str, _domain: &str) -> Result<Option<Discovered>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.found.clone())
    }
}

pub struct FakePhoneVerifier {
    result: Result<Option<PhoneVerdict>, ProviderError>,
    calls: AtomicUsize,
}

impl FakePhoneVerifier {
    pub fn answering(verdict: Option<PhoneVerdict>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(verdict),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn valid(confidence: u8) -> Arc<Self> {
        Self::answering(Some(PhoneVerdict {
            valid: true,
            confidence,
            line_type: Some("mobile".into()),
        }))
    }

    pub fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(err),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhoneVerifier for FakePhoneVerifier {
    async fn verify_phone(
        &self,
        _phone: &str,
        _name: Option<&str>,
        _company: Option<&str>,
    ) -> Result<Option<PhoneVerdict>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub struct FakePhoneDiscoverer {
    result: Result<Option<Discovered>, ProviderError>,
    calls: AtomicUsize,
}

impl FakePhoneDiscoverer {
    pub fn finding(number: Option<&str>, confidence: Option<u8>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(number.map(|value| Discovered {
                value: value.to_string(),
                confidence,
            })),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            result: Err(err),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhoneDiscoverer for FakePhoneDiscoverer {
    async fn discover_phone(
        &self,
        _name: Option<&str>,
        _company: Option<&str>,
        _linkedin_url: Option<&str>,
    ) -> Result<Option<Discovered>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

pub struct FakeProfileFetcher {
    result: Result<Option<Vec<RoleSpan>>, ProviderError>,
    calls: AtomicUsize,
}

impl FakeProfileFetcher {
    pub fn returning(history: Option<Vec<RoleSpan>>) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(history),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for FakeProfileFetcher {
    async fn fetch_profile(&self, _linkedin_url: &str) -> Result<Option<Vec<RoleSpan>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Company data provider serving fixed search results and employees
pub struct FakeCompanyData {
    companies: Vec<CompanyRecord>,
    employees: Vec<EmployeeRecord>,
    pub search_calls: AtomicUsize,
    pub employee_calls: AtomicUsize,
}

impl FakeCompanyData {
    pub fn new(companies: Vec<CompanyRecord>, employees: Vec<EmployeeRecord>) -> Arc<Self> {
        Arc::new(Self {
            companies,
            employees,
            search_calls: AtomicUsize::new(0),
            employee_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompanySearch for FakeCompanyData {
    async fn search_companies(&self, query: &SearchQuery) -> Result<Vec<CompanyRecord>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.companies.iter().take(query.limit).cloned().collect())
    }
}

#[async_trait]
impl EmployeeSource for FakeCompanyData {
    async fn fetch_employees(
        &self,
        company_id: &str,
        filter: &EmployeeFilter,
    ) -> Result<Vec<EmployeeRecord>, ProviderError> {
        self.employee_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .employees
            .iter()
            .filter(|e| e.company_id == company_id)
            .take(filter.limit)
            .cloned()
            .collect())
    }
}

/// Generative provider that is always unavailable
pub struct UnavailableModel {
    pub calls: AtomicUsize,
}

impl UnavailableModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompanyScorer for UnavailableModel {
    async fn score_company(
        &self,
        _criteria: &BuyerCriteria,
        _firmographics: &Firmographics,
    ) -> Result<CompanyScore, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Api(529, "overloaded".into()))
    }
}

#[async_trait]
impl BuyerGroupClassifier for UnavailableModel {
    async fn classify_buyer_group(
        &self,
        _samples: &[EmployeeSample],
        _context: &ClassificationContext,
    ) -> Result<Vec<BuyerGroupMembership>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Api(529, "overloaded".into()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn person(id: &str, email: Option<&str>, phone: Option<&str>) -> PersonRecord {
    PersonRecord {
        id: id.to_string(),
        full_name: Some("Dana Reyes".into()),
        email: email.map(String::from),
        phone: phone.map(String::from),
        company_name: Some("Acme".into()),
        company_domain: Some("acme.com".into()),
        ..Default::default()
    }
}

pub fn role(start: &str, end: Option<&str>) -> RoleSpan {
    RoleSpan {
        title: Some("Account Executive".into()),
        company: Some("Acme".into()),
        start_date: Some(start.into()),
        end_date: end.map(String::from),
    }
}

pub fn company(id: &str, industry: &str, employees: u32) -> CompanyRecord {
    CompanyRecord {
        company_id: id.to_string(),
        firmographics: Firmographics {
            name: format!("Company {}", id),
            domain: Some(format!("{}.com", id)),
            industry: Some(industry.into()),
            employee_count: Some(employees),
            headcount_growth_pct: Some(12.0),
            open_jobs: Some(8),
            ..Default::default()
        },
    }
}

pub fn employee(id: &str, company_id: &str, title: &str, department: &str, connections: u32) -> EmployeeRecord {
    EmployeeRecord {
        person_id: id.to_string(),
        company_id: company_id.to_string(),
        full_name: format!("Person {}", id),
        title: Some(title.into()),
        department: Some(department.into()),
        connections: Some(connections),
        linkedin_url: None,
    }
}
