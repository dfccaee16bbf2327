//! Provider wiring
//!
//! Builds one guard per configured provider and binds each capability to the
//! cascade/scorer slot that uses it, following the configured stage order.

use super::anthropic::AnthropicClient;
use super::coresignal::CoreSignalClient;
use super::lusha::LushaClient;
use super::myemailverifier::MyEmailVerifierClient;
use super::pdl::PdlClient;
use super::prospeo::ProspeoClient;
use super::twilio::TwilioClient;
use super::zerobounce::ZeroBounceClient;
use super::{
    BuyerGroupClassifier, CompanyScorer, CompanySearch, EmailDiscoverer, EmailVerifier,
    EmployeeSource, PhoneDiscoverer, PhoneVerifier, ProfileFetcher, ProviderError, ProviderGuard,
    ProviderId, RetryPolicy, Slot,
};
use crate::config::{EngineConfig, ProviderConfig};
use crate::error::{EnrichError, Result};
use crate::ledger::CostLedger;
use crate::types::CostCategory;
use lead_common::EventBus;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One phone cascade stage
#[derive(Clone)]
pub enum PhoneStage {
    /// Checks a number already in hand
    Verify(Slot<dyn PhoneVerifier>),
    /// Looks a number up from name/company/LinkedIn
    Discover(Slot<dyn PhoneDiscoverer>),
}

impl PhoneStage {
    pub fn id(&self) -> &str {
        match self {
            PhoneStage::Verify(slot) => slot.id(),
            PhoneStage::Discover(slot) => slot.id(),
        }
    }
}

/// Every capability available to a run
#[derive(Clone, Default)]
pub struct ProviderSet {
    /// Primary first
    pub email_verifiers: Vec<Slot<dyn EmailVerifier>>,
    pub email_discoverers: Vec<Slot<dyn EmailDiscoverer>>,
    pub phone_stages: Vec<PhoneStage>,
    pub company_search: Option<Slot<dyn CompanySearch>>,
    pub employee_source: Option<Slot<dyn EmployeeSource>>,
    pub profile_fetcher: Option<Slot<dyn ProfileFetcher>>,
    pub company_scorer: Option<Slot<dyn CompanyScorer>>,
    pub classifier: Option<Slot<dyn BuyerGroupClassifier>>,
}

/// Approximate per-call list price (USD) when the config sets none
fn default_cost(id: ProviderId, capability: &str) -> f64 {
    match (id, capability) {
        (ProviderId::ZeroBounce, _) => 0.008,
        (ProviderId::MyEmailVerifier, _) => 0.003,
        (ProviderId::Prospeo, "discover_email") => 0.04,
        (ProviderId::Prospeo, _) => 0.40,
        (ProviderId::Twilio, _) => 0.008,
        (ProviderId::Lusha, _) => 0.30,
        (ProviderId::PeopleDataLabs, _) => 0.28,
        (ProviderId::CoreSignal, "search_companies") => 0.20,
        (ProviderId::CoreSignal, _) => 0.10,
        (ProviderId::Anthropic, _) => 0.004,
    }
}

/// Clients for providers that have credentials
#[derive(Default)]
struct Clients {
    zerobounce: Option<Arc<ZeroBounceClient>>,
    myemailverifier: Option<Arc<MyEmailVerifierClient>>,
    prospeo: Option<Arc<ProspeoClient>>,
    twilio: Option<Arc<TwilioClient>>,
    lusha: Option<Arc<LushaClient>>,
    pdl: Option<Arc<PdlClient>>,
    coresignal: Option<Arc<CoreSignalClient>>,
    anthropic: Option<Arc<AnthropicClient>>,
}

fn config_error(id: ProviderId, err: ProviderError) -> EnrichError {
    EnrichError::Config(format!("{}: {}", id.display_name(), err))
}

impl ProviderSet {
    /// Build adapters for every provider with a resolvable API key
    pub fn from_config(config: &EngineConfig, ledger: Arc<CostLedger>, events: EventBus) -> Result<Self> {
        let mut guards: BTreeMap<ProviderId, Arc<ProviderGuard>> = BTreeMap::new();
        let mut clients = Clients::default();

        for id in ProviderId::ALL {
            let Some(key) = config.api_key(id) else {
                continue;
            };
            let section = config.provider(id);
            let timeout = section.timeout();
            let base_url = section.base_url.clone();

            match id {
                ProviderId::ZeroBounce => {
                    clients.zerobounce = Some(Arc::new(
                        ZeroBounceClient::new(key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::MyEmailVerifier => {
                    clients.myemailverifier = Some(Arc::new(
                        MyEmailVerifierClient::new(key, base_url, timeout)
                            .map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::Prospeo => {
                    clients.prospeo = Some(Arc::new(
                        ProspeoClient::new(key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::Twilio => {
                    clients.twilio = Some(Arc::new(
                        TwilioClient::new(&key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::Lusha => {
                    clients.lusha = Some(Arc::new(
                        LushaClient::new(key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::PeopleDataLabs => {
                    clients.pdl = Some(Arc::new(
                        PdlClient::new(key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::CoreSignal => {
                    clients.coresignal = Some(Arc::new(
                        CoreSignalClient::new(key, base_url, timeout).map_err(|e| config_error(id, e))?,
                    ))
                }
                ProviderId::Anthropic => {
                    clients.anthropic = Some(Arc::new(
                        AnthropicClient::new(key, base_url, section.model.clone(), timeout)
                            .map_err(|e| config_error(id, e))?,
                    ))
                }
            }

            guards.insert(
                id,
                Arc::new(build_guard(
                    id,
                    &section,
                    config.cascade.quota_headroom,
                    Arc::clone(&ledger),
                    events.clone(),
                )),
            );
        }

        tracing::info!(
            providers = ?guards.keys().map(|id| id.as_str()).collect::<Vec<_>>(),
            "Configured providers"
        );

        let slot_meta = |id: ProviderId, capability: &str, category: CostCategory| {
            let guard = guards.get(&id).cloned();
            let cost = config.provider(id).cost_for(capability, default_cost(id, capability));
            guard.map(|g| (g, category, cost))
        };

        let mut set = ProviderSet::default();

        for name in &config.cascade.email_verifiers {
            let id = parse_listed(name, "cascade.email_verifiers")?;
            let provider: Option<Arc<dyn EmailVerifier>> = match id {
                ProviderId::ZeroBounce => clients.zerobounce.clone().map(|c| c as Arc<dyn EmailVerifier>),
                ProviderId::MyEmailVerifier => {
                    clients.myemailverifier.clone().map(|c| c as Arc<dyn EmailVerifier>)
                }
                other => return Err(unsupported(other, "verify email")),
            };
            if let (Some(provider), Some((guard, category, cost))) =
                (provider, slot_meta(id, "verify_email", CostCategory::Email))
            {
                set.email_verifiers.push(Slot::new(provider, guard, category, cost));
            }
        }

        for name in &config.cascade.email_discoverers {
            let id = parse_listed(name, "cascade.email_discoverers")?;
            let provider: Option<Arc<dyn EmailDiscoverer>> = match id {
                ProviderId::Prospeo => clients.prospeo.clone().map(|c| c as Arc<dyn EmailDiscoverer>),
                other => return Err(unsupported(other, "discover email")),
            };
            if let (Some(provider), Some((guard, category, cost))) =
                (provider, slot_meta(id, "discover_email", CostCategory::Email))
            {
                set.email_discoverers.push(Slot::new(provider, guard, category, cost));
            }
        }

        for name in &config.cascade.phone_providers {
            let id = parse_listed(name, "cascade.phone_providers")?;
            let stage = match id {
                ProviderId::Twilio => clients.twilio.clone().and_then(|c| {
                    slot_meta(id, "verify_phone", CostCategory::Phone).map(|(g, cat, cost)| {
                        PhoneStage::Verify(Slot::new(c as Arc<dyn PhoneVerifier>, g, cat, cost))
                    })
                }),
                ProviderId::Lusha | ProviderId::Prospeo | ProviderId::PeopleDataLabs => {
                    let provider: Option<Arc<dyn PhoneDiscoverer>> = match id {
                        ProviderId::Lusha => clients.lusha.clone().map(|c| c as Arc<dyn PhoneDiscoverer>),
                        ProviderId::Prospeo => clients.prospeo.clone().map(|c| c as Arc<dyn PhoneDiscoverer>),
                        _ => clients.pdl.clone().map(|c| c as Arc<dyn PhoneDiscoverer>),
                    };
                    provider.and_then(|p| {
                        slot_meta(id, "discover_phone", CostCategory::Phone)
                            .map(|(g, cat, cost)| PhoneStage::Discover(Slot::new(p, g, cat, cost)))
                    })
                }
                other => return Err(unsupported(other, "phone lookup")),
            };
            if let Some(stage) = stage {
                set.phone_stages.push(stage);
            }
        }

        if let Some(client) = clients.coresignal.clone() {
            if let Some((g, cat, cost)) =
                slot_meta(ProviderId::CoreSignal, "search_companies", CostCategory::Search)
            {
                set.company_search = Some(Slot::new(client.clone() as Arc<dyn CompanySearch>, g, cat, cost));
            }
            if let Some((g, cat, cost)) =
                slot_meta(ProviderId::CoreSignal, "fetch_employees", CostCategory::Collect)
            {
                set.employee_source = Some(Slot::new(client as Arc<dyn EmployeeSource>, g, cat, cost));
            }
        }

        if let Some(client) = clients.pdl.clone() {
            if let Some((g, cat, cost)) =
                slot_meta(ProviderId::PeopleDataLabs, "fetch_profile", CostCategory::Collect)
            {
                set.profile_fetcher = Some(Slot::new(client as Arc<dyn ProfileFetcher>, g, cat, cost));
            }
        }

        if config.scoring.use_generative {
            if let Some(client) = clients.anthropic.clone() {
                if let Some((g, cat, cost)) =
                    slot_meta(ProviderId::Anthropic, "score_company", CostCategory::Scoring)
                {
                    set.company_scorer =
                        Some(Slot::new(client.clone() as Arc<dyn CompanyScorer>, g, cat, cost));
                }
                if let Some((g, cat, cost)) =
                    slot_meta(ProviderId::Anthropic, "classify_buyer_group", CostCategory::Scoring)
                {
                    set.classifier = Some(Slot::new(client as Arc<dyn BuyerGroupClassifier>, g, cat, cost));
                }
            }
        }

        Ok(set)
    }

    /// Contact verification needs at least one paid stage
    pub fn ensure_contacts(&self) -> Result<()> {
        if self.email_verifiers.is_empty()
            && self.email_discoverers.is_empty()
            && self.phone_stages.is_empty()
        {
            return Err(EnrichError::Config(
                "No email or phone provider credentials configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Buyer-group runs need company search and employee lookup
    pub fn ensure_buyer_group(&self) -> Result<()> {
        if self.company_search.is_none() || self.employee_source.is_none() {
            return Err(EnrichError::Config(
                "Buyer-group runs require CoreSignal credentials (LEAD_CORESIGNAL_API_KEY)".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_listed(name: &str, setting: &str) -> Result<ProviderId> {
    ProviderId::parse(name)
        .ok_or_else(|| EnrichError::Config(format!("{}: unknown provider '{}'", setting, name)))
}

fn unsupported(id: ProviderId, capability: &str) -> EnrichError {
    EnrichError::Config(format!("{} cannot {}", id.display_name(), capability))
}

fn build_guard(
    id: ProviderId,
    section: &ProviderConfig,
    headroom: u32,
    ledger: Arc<CostLedger>,
    events: EventBus,
) -> ProviderGuard {
    let retry = RetryPolicy {
        max_attempts: section.max_attempts.max(1),
        initial_backoff: Duration::from_millis(section.initial_backoff_ms),
        max_backoff: Duration::from_millis(section.max_backoff_ms),
    };
    ProviderGuard::new(
        id.as_str(),
        ledger,
        events,
        section.rate_per_second,
        section.timeout(),
        retry,
    )
    .with_quota(section.daily_quota, headroom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for id in ProviderId::ALL {
            std::env::remove_var(id.env_var());
        }
    }

    #[test]
    #[serial]
    fn test_builds_slots_in_configured_order() {
        clear_env();
        let config: EngineConfig = toml::from_str(
            r#"
            [cascade]
            phone_providers = ["pdl", "twilio"]

            [providers.zerobounce]
            api_key = "zb"
            [providers.myemailverifier]
            api_key = "mev"
            [providers.twilio]
            api_key = "AC1:tok"
            [providers.pdl]
            api_key = "pdl"
            cost_per_call = 0.5
            "#,
        )
        .unwrap();

        let set = ProviderSet::from_config(&config, Arc::new(CostLedger::new(None)), EventBus::new(8))
            .unwrap();

        let verifiers: Vec<&str> = set.email_verifiers.iter().map(|s| s.id()).collect();
        assert_eq!(verifiers, vec!["zerobounce", "myemailverifier"]);

        let phones: Vec<&str> = set.phone_stages.iter().map(|s| s.id()).collect();
        assert_eq!(phones, vec!["pdl", "twilio"]);
        assert!(matches!(set.phone_stages[0], PhoneStage::Discover(_)));

        assert!(set.profile_fetcher.is_some());
        assert_eq!(set.profile_fetcher.as_ref().unwrap().cost, 0.5);
        assert!(set.company_search.is_none());
        assert!(set.ensure_contacts().is_ok());
        assert!(set.ensure_buyer_group().is_err());
    }

    #[test]
    #[serial]
    fn test_no_credentials_is_a_config_error_for_contacts() {
        clear_env();
        let set = ProviderSet::from_config(
            &EngineConfig::default(),
            Arc::new(CostLedger::new(None)),
            EventBus::new(8),
        )
        .unwrap();

        assert!(matches!(set.ensure_contacts(), Err(EnrichError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_bad_twilio_credentials_rejected() {
        clear_env();
        let config: EngineConfig = toml::from_str("[providers.twilio]\napi_key = \"nocolon\"").unwrap();
        let result = ProviderSet::from_config(&config, Arc::new(CostLedger::new(None)), EventBus::new(8));
        assert!(matches!(result, Err(EnrichError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_capability_mismatch_rejected() {
        clear_env();
        let config: EngineConfig =
            toml::from_str("[cascade]\nemail_verifiers = [\"lusha\"]").unwrap();
        let result = ProviderSet::from_config(&config, Arc::new(CostLedger::new(None)), EventBus::new(8));
        assert!(matches!(result, Err(EnrichError::Config(_))));
    }
}
