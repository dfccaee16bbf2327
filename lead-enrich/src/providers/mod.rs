//! Provider capabilities
//!
//! Every external data source is reached through one of the capability traits
//! below. Callers hold a [`Slot`], which pairs a capability with the
//! [`ProviderGuard`] enforcing rate limits, quotas, budget, timeouts, retries
//! and auth-failure disablement for that provider.

pub mod anthropic;
pub mod coresignal;
pub mod guard;
pub mod http;
pub mod lusha;
pub mod myemailverifier;
pub mod pdl;
pub mod prospeo;
pub mod registry;
pub mod twilio;
pub mod zerobounce;

pub use guard::{Charged, ProviderGuard, RetryPolicy};
pub use registry::{PhoneStage, ProviderSet};

use crate::buyer_group::criteria::{BuyerCriteria, EmployeeFilter, SearchQuery};
use crate::types::{
    BuyerGroupMembership, CompanyRecord, CostCategory, EmployeeRecord, EmployeeSample,
    Firmographics, RoleSpan,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Provider call errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Daily quota reached")]
    QuotaExceeded,

    #[error("Run budget exhausted")]
    BudgetExhausted,

    #[error("Provider disabled for this run")]
    Disabled,

    #[error("Rate limited by vendor")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Worth retrying after a backoff
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited => true,
            ProviderError::Api(status, _) => *status >= 500,
            _ => false,
        }
    }

    /// Refused before any request was made
    pub fn is_local_skip(&self) -> bool {
        matches!(
            self,
            ProviderError::QuotaExceeded | ProviderError::BudgetExhausted | ProviderError::Disabled
        )
    }
}

// ============================================================================
// Provider identities
// ============================================================================

/// Known providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderId {
    ZeroBounce,
    MyEmailVerifier,
    Prospeo,
    Twilio,
    Lusha,
    PeopleDataLabs,
    CoreSignal,
    Anthropic,
}

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        ProviderId::ZeroBounce,
        ProviderId::MyEmailVerifier,
        ProviderId::Prospeo,
        ProviderId::Twilio,
        ProviderId::Lusha,
        ProviderId::PeopleDataLabs,
        ProviderId::CoreSignal,
        ProviderId::Anthropic,
    ];

    /// Config section and log name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::ZeroBounce => "zerobounce",
            ProviderId::MyEmailVerifier => "myemailverifier",
            ProviderId::Prospeo => "prospeo",
            ProviderId::Twilio => "twilio",
            ProviderId::Lusha => "lusha",
            ProviderId::PeopleDataLabs => "pdl",
            ProviderId::CoreSignal => "coresignal",
            ProviderId::Anthropic => "anthropic",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::ZeroBounce => "ZeroBounce",
            ProviderId::MyEmailVerifier => "MyEmailVerifier",
            ProviderId::Prospeo => "Prospeo",
            ProviderId::Twilio => "Twilio",
            ProviderId::Lusha => "Lusha",
            ProviderId::PeopleDataLabs => "People Data Labs",
            ProviderId::CoreSignal => "CoreSignal",
            ProviderId::Anthropic => "Anthropic",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    /// `LEAD_<PROVIDER>_API_KEY`
    pub fn env_var(&self) -> String {
        format!("LEAD_{}_API_KEY", self.as_str().to_uppercase())
    }
}

// ============================================================================
// Capability results
// ============================================================================

/// SMTP-level verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    Valid,
    CatchAll,
    Unknown,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailVerdict {
    pub status: EmailStatus,
    /// Vendor confidence for a `Valid` verdict, 0-100
    pub confidence: u8,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhoneVerdict {
    pub valid: bool,
    pub confidence: u8,
    pub line_type: Option<String>,
}

/// Value found by a discovery call
#[derive(Debug, Clone, PartialEq)]
pub struct Discovered {
    pub value: String,
    /// Vendor confidence, when it reports one
    pub confidence: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyScore {
    pub score: u8,
    pub rationale: String,
}

/// Context passed to buyer-group classification
#[derive(Debug, Clone)]
pub struct ClassificationContext {
    pub company_id: String,
    pub firmographics: Firmographics,
    pub criteria: BuyerCriteria,
}

// ============================================================================
// Capability traits
// ============================================================================

#[async_trait]
pub trait EmailVerifier: Send + Sync {
    async fn verify_email(
        &self,
        email: &str,
        name: Option<&str>,
        domain: Option<&str>,
    ) -> Result<EmailVerdict, ProviderError>;
}

#[async_trait]
pub trait EmailDiscoverer: Send + Sync {
    async fn discover_email(&self, name: &str, domain: &str)
        -> Result<Option<Discovered>, ProviderError>;
}

#[async_trait]
pub trait PhoneVerifier: Send + Sync {
    /// `Ok(None)` when the vendor has no data for the number
    async fn verify_phone(
        &self,
        phone: &str,
        name: Option<&str>,
        company: Option<&str>,
    ) -> Result<Option<PhoneVerdict>, ProviderError>;
}

#[async_trait]
pub trait PhoneDiscoverer: Send + Sync {
    /// Whether the inputs are sufficient for this vendor
    fn can_discover(&self, name: Option<&str>, company: Option<&str>, linkedin_url: Option<&str>) -> bool {
        name.is_some() && (company.is_some() || linkedin_url.is_some())
    }

    async fn discover_phone(
        &self,
        name: Option<&str>,
        company: Option<&str>,
        linkedin_url: Option<&str>,
    ) -> Result<Option<Discovered>, ProviderError>;
}

#[async_trait]
pub trait CompanySearch: Send + Sync {
    async fn search_companies(&self, query: &SearchQuery) -> Result<Vec<CompanyRecord>, ProviderError>;
}

#[async_trait]
pub trait EmployeeSource: Send + Sync {
    async fn fetch_employees(
        &self,
        company_id: &str,
        filter: &EmployeeFilter,
    ) -> Result<Vec<EmployeeRecord>, ProviderError>;
}

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    /// Career history for a LinkedIn profile, `Ok(None)` when unknown
    async fn fetch_profile(&self, linkedin_url: &str) -> Result<Option<Vec<RoleSpan>>, ProviderError>;
}

#[async_trait]
pub trait CompanyScorer: Send + Sync {
    async fn score_company(
        &self,
        criteria: &BuyerCriteria,
        firmographics: &Firmographics,
    ) -> Result<CompanyScore, ProviderError>;
}

#[async_trait]
pub trait BuyerGroupClassifier: Send + Sync {
    async fn classify_buyer_group(
        &self,
        samples: &[EmployeeSample],
        context: &ClassificationContext,
    ) -> Result<Vec<BuyerGroupMembership>, ProviderError>;
}

// ============================================================================
// Slot
// ============================================================================

/// A capability bound to its provider's guard, cost category and per-call cost
pub struct Slot<T: ?Sized> {
    pub provider: Arc<T>,
    pub guard: Arc<ProviderGuard>,
    pub category: CostCategory,
    pub cost: f64,
}

impl<T: ?Sized> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            guard: Arc::clone(&self.guard),
            category: self.category,
            cost: self.cost,
        }
    }
}

impl<T: ?Sized> Slot<T> {
    pub fn new(provider: Arc<T>, guard: Arc<ProviderGuard>, category: CostCategory, cost: f64) -> Self {
        Self {
            provider,
            guard,
            category,
            cost,
        }
    }

    /// Provider id, as recorded in `sources_attempted`
    pub fn id(&self) -> &str {
        self.guard.id()
    }

    /// Run one capability call through the guard
    pub async fn call<'a, F, Fut, R>(&'a self, operation: F) -> Result<Charged<R>, ProviderError>
    where
        F: FnMut(&'a T) -> Fut,
        Fut: std::future::Future<Output = Result<R, ProviderError>>,
    {
        let provider: &'a T = &self.provider;
        let mut operation = operation;
        self.guard
            .call(self.category, self.cost, || operation(provider))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Api(503, String::new()).is_transient());
        assert!(!ProviderError::Api(400, String::new()).is_transient());
        assert!(!ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
    }

    #[test]
    fn test_provider_id_round_trip() {
        for id in ProviderId::ALL {
            assert_eq!(ProviderId::parse(id.as_str()), Some(id));
        }
        assert_eq!(ProviderId::PeopleDataLabs.env_var(), "LEAD_PDL_API_KEY");
        assert!(ProviderId::parse("clearbit").is_none());
    }
}
