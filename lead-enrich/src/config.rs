//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty (or missing) file
//! yields a working configuration; only provider credentials have to be supplied.
//!
//! ```toml
//! [batch]
//! workers = 8
//! budget = 250.0
//!
//! [cascade]
//! success_threshold = 90
//!
//! [providers.zerobounce]
//! api_key = "..."
//! daily_quota = 5000
//! ```

use crate::error::{EnrichError, Result};
use crate::providers::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Data folder holding `lead-enrich.db` (CLI and env var take precedence)
    pub root_folder: Option<PathBuf>,
    pub batch: BatchConfig,
    pub cascade: CascadeConfig,
    pub churn: ChurnConfig,
    pub scoring: ScoringConfig,
    /// Keyed by provider id ("zerobounce", "twilio", ...)
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let config: EngineConfig = lead_common::config::load_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Locate and load the config file, or fall back to defaults when none exists
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match lead_common::config::locate_config_file(explicit) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading engine configuration");
                Ok((Self::load(&path)?, Some(path)))
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Reject values that would make a batch misbehave
    pub fn validate(&self) -> Result<()> {
        if self.batch.workers == 0 {
            return Err(EnrichError::Config("batch.workers must be at least 1".into()));
        }
        if self.cascade.success_threshold > 100 {
            return Err(EnrichError::Config(
                "cascade.success_threshold must be within 0-100".into(),
            ));
        }
        if self.churn.default_average_tenure_months <= 0.0 {
            return Err(EnrichError::Config(
                "churn.default_average_tenure_months must be positive".into(),
            ));
        }
        if self.cascade.phone_providers.len() > 4 {
            return Err(EnrichError::Config(
                "cascade.phone_providers accepts at most four providers".into(),
            ));
        }
        for (name, provider) in &self.providers {
            if ProviderId::parse(name).is_none() {
                return Err(EnrichError::Config(format!("Unknown provider section: {}", name)));
            }
            if provider.max_attempts == 0 {
                return Err(EnrichError::Config(format!(
                    "providers.{}.max_attempts must be at least 1",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Provider section, or defaults when the section is absent
    pub fn provider(&self, id: ProviderId) -> ProviderConfig {
        self.providers.get(id.as_str()).cloned().unwrap_or_default()
    }

    /// API key for a provider: `LEAD_<PROVIDER>_API_KEY`, then TOML
    pub fn api_key(&self, id: ProviderId) -> Option<String> {
        let section = self.providers.get(id.as_str());
        if section.map(|p| !p.enabled).unwrap_or(false) {
            return None;
        }
        lead_common::config::resolve_secret(
            id.display_name(),
            &id.env_var(),
            section.and_then(|p| p.api_key.as_deref()),
        )
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent records in flight
    pub workers: usize,
    /// Flush the checkpoint after this many processed records
    pub checkpoint_every: usize,
    /// ...or after this many seconds, whichever comes first
    pub checkpoint_interval_secs: u64,
    pub progress_interval_secs: u64,
    /// Per-record error messages kept in the report
    pub max_reported_errors: usize,
    /// Run budget across all cost categories; paid calls stop once reached
    pub budget: Option<f64>,
    /// Maximum time spent retrying a locked SQLite write
    pub db_lock_wait_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            checkpoint_every: 25,
            checkpoint_interval_secs: 30,
            progress_interval_secs: 5,
            max_reported_errors: 20,
            budget: None,
            db_lock_wait_ms: 5000,
        }
    }
}

impl BatchConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.max(1))
    }
}

/// Confidence constants and stage ordering for the verification cascades
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// A stage at or above this confidence ends the cascade
    pub success_threshold: u8,
    /// Heuristic: email domain matches the company domain and the local part matches the name
    pub domain_name_match_confidence: u8,
    /// Heuristic: domain matches, local part does not resemble the name
    pub domain_match_confidence: u8,
    /// Heuristic: corporate domain unrelated to the company
    pub unrelated_domain_confidence: u8,
    /// Heuristic: free-mail domain
    pub personal_domain_confidence: u8,
    /// Final confidence ceiling for free-mail addresses
    pub personal_domain_cap: u8,
    /// Spend SMTP credits on free-mail addresses
    pub verify_personal_domains: bool,
    pub catch_all_confidence: u8,
    pub unknown_confidence: u8,
    /// Confidence given to a discovered value no later stage verified
    pub discovered_confidence: u8,
    /// Jaro-Winkler similarity at which a local part counts as a name pattern
    pub name_similarity_threshold: f64,
    /// Free-mail domains
    pub personal_domains: Vec<String>,
    /// Email verifiers, primary first
    pub email_verifiers: Vec<String>,
    pub email_discoverers: Vec<String>,
    /// Phone stages in priority order (at most four)
    pub phone_providers: Vec<String>,
    /// Spacing between consecutive phone provider calls for one record
    pub phone_call_delay_ms: u64,
    /// Country code prepended to 10-digit numbers
    pub default_country_code: String,
    /// Skip a provider once its daily usage is within this many calls of the quota
    pub quota_headroom: u32,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            success_threshold: 90,
            domain_name_match_confidence: 75,
            domain_match_confidence: 60,
            unrelated_domain_confidence: 40,
            personal_domain_confidence: 50,
            personal_domain_cap: 70,
            verify_personal_domains: false,
            catch_all_confidence: 60,
            unknown_confidence: 40,
            discovered_confidence: 55,
            name_similarity_threshold: 0.9,
            personal_domains: DEFAULT_PERSONAL_DOMAINS.iter().map(|d| d.to_string()).collect(),
            email_verifiers: vec!["zerobounce".into(), "myemailverifier".into()],
            email_discoverers: vec!["prospeo".into()],
            phone_providers: vec![
                "twilio".into(),
                "lusha".into(),
                "prospeo".into(),
                "pdl".into(),
            ],
            phone_call_delay_ms: 250,
            default_country_code: "1".into(),
            quota_headroom: 0,
        }
    }
}

const DEFAULT_PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "icloud.com",
    "aol.com",
    "proton.me",
    "protonmail.com",
    "live.com",
    "me.com",
    "gmx.com",
    "yandex.com",
    "mail.com",
];

/// Churn curve parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    /// Average tenure used when fewer than one prior role is known
    pub default_average_tenure_months: f64,
    /// Score when current tenure is at or below `low_ratio` of the average
    pub base_score: f64,
    pub low_ratio: f64,
    pub mid_ratio: f64,
    pub mid_score: f64,
    /// Score when current tenure equals the average
    pub at_average_score: f64,
    /// Extra points per unit of ratio beyond the average
    pub overdue_slope: f64,
    pub overdue_max_bonus: f64,
    /// +5 at three completed roles
    pub frequent_mover_bonus: f64,
    /// +10 at five completed roles
    pub serial_mover_bonus: f64,
    pub high_score: u8,
    pub medium_score: u8,
    pub high_predicted_months: f64,
    pub medium_predicted_months: f64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            default_average_tenure_months: 24.0,
            base_score: 30.0,
            low_ratio: 0.5,
            mid_ratio: 0.75,
            mid_score: 55.0,
            at_average_score: 70.0,
            overdue_slope: 40.0,
            overdue_max_bonus: 20.0,
            frequent_mover_bonus: 5.0,
            serial_mover_bonus: 10.0,
            high_score: 60,
            medium_score: 40,
            high_predicted_months: 3.0,
            medium_predicted_months: 6.0,
        }
    }
}

/// Buyer-group scoring and sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Prefer the generative scorer/classifier when configured
    pub use_generative: bool,
    pub size_weight: f64,
    pub industry_weight: f64,
    pub growth_weight: f64,
    pub hiring_weight: f64,
    /// Employees sampled per department
    pub per_department_limit: usize,
    /// Total employees sampled per company
    pub max_sample: usize,
    /// Employees requested from the provider per company
    pub fetch_limit: usize,
    /// Companies requested from the search provider
    pub search_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            use_generative: true,
            size_weight: 35.0,
            industry_weight: 30.0,
            growth_weight: 20.0,
            hiring_weight: 15.0,
            per_department_limit: 3,
            max_sample: 15,
            fetch_limit: 100,
            search_limit: 50,
        }
    }
}

/// One `[providers.<name>]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Set to false to leave the provider out even when a key is present
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Override of the vendor endpoint (tests, proxies)
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub rate_per_second: u32,
    pub daily_quota: Option<u32>,
    /// Cost charged per successful call; vendor default when unset
    pub cost_per_call: Option<f64>,
    /// Per-capability cost overrides ("verify_email", "fetch_employees", ...)
    pub costs: BTreeMap<String, f64>,
    /// Attempts for transient failures (1 = no retry)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Model name for generative providers
    pub model: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            rate_per_second: 5,
            daily_quota: None,
            cost_per_call: None,
            costs: BTreeMap::new(),
            max_attempts: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 2000,
            model: None,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Cost of one call to `capability`, falling back to `default`
    pub fn cost_for(&self, capability: &str, default: f64) -> f64 {
        self.costs
            .get(capability)
            .copied()
            .or(self.cost_per_call)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.batch.workers, 8);
        assert_eq!(config.cascade.success_threshold, 90);
        assert_eq!(config.cascade.personal_domain_cap, 70);
        assert_eq!(config.churn.default_average_tenure_months, 24.0);
        assert_eq!(config.scoring.per_department_limit, 3);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_provider_section_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [providers.zerobounce]
            api_key = "zb-key"
            daily_quota = 100

            [providers.coresignal.costs]
            fetch_employees = 2.0
            "#,
        )
        .unwrap();

        let zb = config.provider(ProviderId::ZeroBounce);
        assert_eq!(zb.daily_quota, Some(100));
        assert_eq!(zb.timeout_secs, 30);
        assert_eq!(zb.max_attempts, 2);

        let cs = config.provider(ProviderId::CoreSignal);
        assert_eq!(cs.cost_for("fetch_employees", 1.0), 2.0);
        assert_eq!(cs.cost_for("search_companies", 1.0), 1.0);
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let config: EngineConfig = toml::from_str("[providers.clearbit]\napi_key = \"x\"").unwrap();
        assert!(matches!(config.validate(), Err(EnrichError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = EngineConfig::default();
        config.batch.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_api_key_env_overrides_toml() {
        let config: EngineConfig =
            toml::from_str("[providers.lusha]\napi_key = \"toml-key\"").unwrap();

        std::env::set_var("LEAD_LUSHA_API_KEY", "env-key");
        let key = config.api_key(ProviderId::Lusha);
        std::env::remove_var("LEAD_LUSHA_API_KEY");
        assert_eq!(key.as_deref(), Some("env-key"));

        assert_eq!(config.api_key(ProviderId::Lusha).as_deref(), Some("toml-key"));
    }

    #[test]
    #[serial]
    fn test_disabled_provider_has_no_key() {
        std::env::remove_var("LEAD_PDL_API_KEY");
        let config: EngineConfig =
            toml::from_str("[providers.pdl]\nenabled = false\napi_key = \"k\"").unwrap();
        assert!(config.api_key(ProviderId::PeopleDataLabs).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[batch]\nworkers = 3\nbudget = 12.5\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.batch.workers, 3);
        assert_eq!(config.batch.budget, Some(12.5));
    }
}
