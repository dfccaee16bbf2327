//! Email verification cascade
//!
//! Stage order: syntax (local) → domain heuristic (local) → primary SMTP
//! verifier → secondary SMTP verifier (only if the primary gave no verdict) →
//! discovery (only when no valid email exists; its find is re-validated).

use super::error_attempt;
use crate::config::CascadeConfig;
use crate::providers::{EmailDiscoverer, EmailStatus, EmailVerifier, Slot};
use crate::types::{AttemptOutcome, ContactCandidate, SourceAttempt, VerificationResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const SYNTAX_STAGE: &str = "syntax";
pub const HEURISTIC_STAGE: &str = "domain-heuristic";

static EMAIL_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$")
        .unwrap_or_else(|e| panic!("invalid email pattern: {}", e))
});

/// Trim, lower-case and check an address; `None` when malformed
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;

    if local.is_empty()
        || local.len() > 64
        || local.starts_with('.')
        || local.ends_with('.')
        || email.contains("..")
        || domain.contains('@')
        || !EMAIL_SYNTAX.is_match(&email)
    {
        return None;
    }
    Some(email)
}

/// Bare host from a domain or URL ("https://www.Acme.com/about" → "acme.com")
pub fn normalize_domain(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty() && host.contains('.')).then(|| host.to_string())
}

fn alnum(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Local-part patterns derived from a full name
fn name_patterns(full_name: &str) -> Vec<String> {
    let parts: Vec<String> = full_name
        .split_whitespace()
        .map(|p| alnum(&p.to_lowercase()))
        .filter(|p| !p.is_empty())
        .collect();

    let Some(first) = parts.first() else {
        return Vec::new();
    };
    let Some(last) = parts.last().filter(|_| parts.len() > 1) else {
        return vec![first.clone()];
    };
    let f = &first[..1];

    vec![
        format!("{}.{}", first, last),
        format!("{}{}", first, last),
        format!("{}{}", f, last),
        first.clone(),
        format!("{}_{}", first, last),
        format!("{}.{}", f, last),
        format!("{}{}", last, f),
    ]
}

/// Whether an email local part resembles the person's name
pub fn local_part_matches_name(local: &str, full_name: &str, threshold: f64) -> bool {
    name_patterns(full_name)
        .iter()
        .any(|pattern| strsim::jaro_winkler(local, pattern) >= threshold)
}

/// Domain-match heuristic contribution and a short explanation
pub fn domain_heuristic(
    email: &str,
    name: Option<&str>,
    company_domain: Option<&str>,
    config: &CascadeConfig,
) -> (u8, String) {
    let (local, email_domain) = email.split_once('@').unwrap_or((email, ""));

    let domain_match = company_domain
        .map(|cd| email_domain == cd || email_domain.ends_with(&format!(".{}", cd)))
        .unwrap_or(false);

    if domain_match {
        let name_match = name
            .map(|n| local_part_matches_name(local, n, config.name_similarity_threshold))
            .unwrap_or(false);
        if name_match {
            return (config.domain_name_match_confidence, "company domain, name pattern".into());
        }
        return (config.domain_match_confidence, "company domain".into());
    }

    if is_personal_domain(email_domain, config) {
        return (config.personal_domain_confidence, "personal domain".into());
    }
    (config.unrelated_domain_confidence, "unrelated corporate domain".into())
}

pub fn is_personal_domain(domain: &str, config: &CascadeConfig) -> bool {
    config.personal_domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
}

/// What the SMTP stages concluded about one address
enum SmtpVerdict {
    Accepted(u8),
    Rejected,
    /// Every verifier errored, timed out or was skipped
    NoVerdict,
}

pub struct EmailCascade {
    verifiers: Vec<Slot<dyn EmailVerifier>>,
    discoverers: Vec<Slot<dyn EmailDiscoverer>>,
    config: CascadeConfig,
}

/// Mutable state of one cascade invocation
struct Run {
    attempts: Vec<SourceAttempt>,
    cost: f64,
}

impl EmailCascade {
    pub fn new(
        verifiers: Vec<Slot<dyn EmailVerifier>>,
        discoverers: Vec<Slot<dyn EmailDiscoverer>>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            verifiers,
            discoverers,
            config,
        }
    }

    /// Verify (and if needed discover) the email for one candidate
    pub async fn verify(&self, candidate: &ContactCandidate) -> VerificationResult {
        let name = candidate
            .associated_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let domain = candidate.associated_domain.as_deref().and_then(normalize_domain);
        let mut run = Run {
            attempts: Vec::new(),
            cost: 0.0,
        };

        let raw = candidate.raw_value.trim();
        if raw.is_empty() {
            if let (Some(name), Some(domain)) = (name, domain.as_deref()) {
                return self.discover(candidate, name, domain, run).await;
            }
            run.attempts
                .push(SourceAttempt::new(SYNTAX_STAGE, AttemptOutcome::Invalid, 0).with_detail("empty"));
            return VerificationResult::rejected(candidate, run.attempts);
        }

        let Some(email) = normalize_email(raw) else {
            tracing::debug!(record_id = %candidate.record_id, "Malformed email, skipping providers");
            run.attempts
                .push(SourceAttempt::new(SYNTAX_STAGE, AttemptOutcome::Invalid, 0).with_detail("malformed"));
            return VerificationResult::rejected(candidate, run.attempts);
        };
        run.attempts
            .push(SourceAttempt::new(SYNTAX_STAGE, AttemptOutcome::Partial, 0).with_detail("well-formed"));

        match self.validate(&email, name, domain.as_deref(), None, &mut run).await {
            Some(confidence) => self.finish(candidate, Some(email), confidence, run),
            None => match (name, domain.as_deref()) {
                (Some(name), Some(domain)) => self.discover(candidate, name, domain, run).await,
                _ => self.finish(candidate, None, 0, run),
            },
        }
    }

    /// Heuristic plus SMTP stages for one address
    ///
    /// Returns the confidence when the address is acceptable, `None` when rejected.
    async fn validate(
        &self,
        email: &str,
        name: Option<&str>,
        domain: Option<&str>,
        prior: Option<u8>,
        run: &mut Run,
    ) -> Option<u8> {
        let (heuristic, detail) = domain_heuristic(email, name, domain, &self.config);
        let personal = email
            .split_once('@')
            .map(|(_, d)| is_personal_domain(d, &self.config))
            .unwrap_or(false);
        let cap = if personal { self.config.personal_domain_cap } else { 100 };
        let best = heuristic.max(prior.unwrap_or(0));

        if heuristic >= self.config.success_threshold {
            run.attempts
                .push(SourceAttempt::new(HEURISTIC_STAGE, AttemptOutcome::Confirmed, heuristic).with_detail(detail));
            return Some(best.min(cap));
        }
        run.attempts
            .push(SourceAttempt::new(HEURISTIC_STAGE, AttemptOutcome::Partial, heuristic).with_detail(detail));

        if personal && !self.config.verify_personal_domains {
            return Some(best.min(cap));
        }

        match self.smtp(email, name, domain, run).await {
            SmtpVerdict::Accepted(confidence) => Some(best.max(confidence).min(cap)),
            SmtpVerdict::NoVerdict => Some(best.min(cap)),
            SmtpVerdict::Rejected => None,
        }
    }

    /// Primary verifier, then the secondary only when the primary gave no verdict
    async fn smtp(&self, email: &str, name: Option<&str>, domain: Option<&str>, run: &mut Run) -> SmtpVerdict {
        for slot in &self.verifiers {
            let charged = match slot.call(|p| p.verify_email(email, name, domain)).await {
                Ok(charged) => charged,
                Err(e) => {
                    run.attempts.push(error_attempt(slot.id(), &e));
                    continue;
                }
            };
            run.cost += charged.cost;
            let verdict = charged.value;

            let (outcome, contribution) = match verdict.status {
                EmailStatus::Valid if verdict.confidence >= self.config.success_threshold => {
                    (AttemptOutcome::Confirmed, verdict.confidence)
                }
                EmailStatus::Valid => (AttemptOutcome::Partial, verdict.confidence),
                EmailStatus::CatchAll => (AttemptOutcome::Partial, self.config.catch_all_confidence),
                EmailStatus::Unknown => (AttemptOutcome::Partial, self.config.unknown_confidence),
                EmailStatus::Invalid => (AttemptOutcome::Invalid, 0),
            };

            let mut attempt = SourceAttempt::new(slot.id(), outcome, contribution);
            if let Some(details) = verdict.details {
                attempt = attempt.with_detail(details);
            }
            run.attempts.push(attempt);

            return match outcome {
                AttemptOutcome::Invalid => SmtpVerdict::Rejected,
                _ => SmtpVerdict::Accepted(contribution),
            };
        }
        SmtpVerdict::NoVerdict
    }

    /// Ask discovery providers in order; each find is re-validated
    async fn discover(
        &self,
        candidate: &ContactCandidate,
        name: &str,
        domain: &str,
        mut run: Run,
    ) -> VerificationResult {
        for slot in &self.discoverers {
            let charged = match slot.call(|p| p.discover_email(name, domain)).await {
                Ok(charged) => charged,
                Err(e) => {
                    run.attempts.push(error_attempt(slot.id(), &e));
                    continue;
                }
            };
            run.cost += charged.cost;

            let Some(found) = charged.value else {
                run.attempts.push(SourceAttempt::new(slot.id(), AttemptOutcome::NoData, 0));
                continue;
            };
            let Some(email) = normalize_email(&found.value) else {
                run.attempts
                    .push(SourceAttempt::new(slot.id(), AttemptOutcome::Invalid, 0).with_detail("malformed result"));
                continue;
            };

            let discovered = found.confidence.unwrap_or(self.config.discovered_confidence);
            run.attempts
                .push(SourceAttempt::new(slot.id(), AttemptOutcome::Discovered, discovered));

            if let Some(confidence) = self
                .validate(&email, Some(name), Some(domain), Some(discovered), &mut run)
                .await
            {
                return self.finish(candidate, Some(email), confidence, run);
            }
        }

        self.finish(candidate, None, 0, run)
    }

    fn finish(
        &self,
        candidate: &ContactCandidate,
        email: Option<String>,
        confidence: u8,
        run: Run,
    ) -> VerificationResult {
        let valid = email.is_some();
        VerificationResult {
            record_id: candidate.record_id.clone(),
            field_kind: candidate.field_kind,
            final_value: email,
            valid,
            confidence: if valid { confidence.min(100) } else { 0 },
            sources_attempted: run.attempts,
            cost_incurred: run.cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Dana.Reyes@Acme.COM "), Some("dana.reyes@acme.com".into()));
        assert!(normalize_email("no-at-sign").is_none());
        assert!(normalize_email("two@@acme.com").is_none());
        assert!(normalize_email("dana..reyes@acme.com").is_none());
        assert!(normalize_email(".dana@acme.com").is_none());
        assert!(normalize_email("dana@acme").is_none());
        assert!(normalize_email("dana@acme.c").is_none());
        assert!(normalize_email("da na@acme.com").is_none());
        assert!(normalize_email(&format!("{}@acme.com", "a".repeat(65))).is_none());
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://www.Acme.com/about"), Some("acme.com".into()));
        assert_eq!(normalize_domain("acme.io"), Some("acme.io".into()));
        assert_eq!(normalize_domain("localhost"), None);
    }

    #[test]
    fn test_name_patterns() {
        let config = CascadeConfig::default();
        for local in ["dana.reyes", "danareyes", "dreyes", "dana", "dana_reyes", "d.reyes", "reyesd"] {
            assert!(
                local_part_matches_name(local, "Dana Reyes", config.name_similarity_threshold),
                "{} should match",
                local
            );
        }
        assert!(!local_part_matches_name("sales", "Dana Reyes", config.name_similarity_threshold));
    }

    #[test]
    fn test_domain_heuristic_contributions() {
        let config = CascadeConfig::default();
        let (score, _) = domain_heuristic("dana.reyes@acme.com", Some("Dana Reyes"), Some("acme.com"), &config);
        assert_eq!(score, 75);
        let (score, _) = domain_heuristic("info@eu.acme.com", Some("Dana Reyes"), Some("acme.com"), &config);
        assert_eq!(score, 60);
        let (score, _) = domain_heuristic("dana@gmail.com", Some("Dana Reyes"), Some("acme.com"), &config);
        assert_eq!(score, 50);
        let (score, _) = domain_heuristic("dana@other.io", Some("Dana Reyes"), Some("acme.com"), &config);
        assert_eq!(score, 40);
    }

    #[tokio::test]
    async fn test_malformed_email_without_providers() {
        let cascade = EmailCascade::new(vec![], vec![], CascadeConfig::default());
        let candidate = ContactCandidate::email("p-1", "not-an-email", None, None);

        let result = cascade.verify(&candidate).await;
        assert!(!result.valid);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.cost_incurred, 0.0);
        assert_eq!(result.sources_attempted.len(), 1);
        assert_eq!(result.sources_attempted[0].outcome, AttemptOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_heuristic_only_result_is_valid() {
        let cascade = EmailCascade::new(vec![], vec![], CascadeConfig::default());
        let candidate = ContactCandidate::email(
            "p-2",
            "dana.reyes@acme.com",
            Some("Dana Reyes".into()),
            Some("acme.com".into()),
        );

        let result = cascade.verify(&candidate).await;
        assert!(result.valid);
        assert_eq!(result.confidence, 75);
        assert_eq!(result.final_value.as_deref(), Some("dana.reyes@acme.com"));
    }

    #[tokio::test]
    async fn test_empty_without_name_and_domain_is_rejected() {
        let cascade = EmailCascade::new(vec![], vec![], CascadeConfig::default());
        let candidate = ContactCandidate::email("p-3", "   ", Some("Dana".into()), None);

        let result = cascade.verify(&candidate).await;
        assert!(!result.valid);
        assert_eq!(result.confidence, 0);
    }
}
