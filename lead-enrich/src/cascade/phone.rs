//! Phone verification cascade
//!
//! Stages run in configured order. Verify stages need a number in hand and are
//! deferred until one is discovered. Discover stages only run while no number
//! is in hand. The cascade stops at the first verify stage that confirms a
//! number at or above the success threshold.

use super::error_attempt;
use crate::config::CascadeConfig;
use crate::providers::{PhoneStage, PhoneVerifier, Slot};
use crate::types::{AttemptOutcome, ContactCandidate, SourceAttempt, VerificationResult};
use std::time::Duration;

pub const FORMAT_STAGE: &str = "format";

/// Strip formatting and produce an E.164-style number
///
/// Letters make a number malformed. A bare 10-digit number gets the default
/// country code; anything else with 7-15 digits is taken as already carrying one.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(7..=15).contains(&digits.len()) {
        return None;
    }

    if !has_plus && digits.len() == 10 {
        return Some(format!("+{}{}", default_country_code, digits));
    }
    Some(format!("+{}", digits))
}

/// What one verify stage said about the number in hand
enum VerifyStep {
    Confirmed(u8),
    Partial(u8),
    Rejected,
    NoEvidence,
}

/// Mutable state of one cascade invocation
struct Run {
    attempts: Vec<SourceAttempt>,
    cost: f64,
    calls: usize,
    value: Option<String>,
    /// Best verify confidence below the threshold for `value`
    verified: Option<u8>,
    /// Confidence of the discovery that produced `value`
    discovered: Option<u8>,
}

impl Run {
    fn clear_value(&mut self) {
        self.value = None;
        self.verified = None;
        self.discovered = None;
    }
}

pub struct PhoneCascade {
    stages: Vec<PhoneStage>,
    config: CascadeConfig,
}

impl PhoneCascade {
    pub fn new(stages: Vec<PhoneStage>, config: CascadeConfig) -> Self {
        Self { stages, config }
    }

    fn inputs<'c>(candidate: &'c ContactCandidate) -> (Option<&'c str>, Option<&'c str>, Option<&'c str>) {
        let clean = |v: &'c Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty());
        (
            clean(&candidate.associated_name),
            clean(&candidate.associated_company),
            clean(&candidate.linkedin_url),
        )
    }

    /// Verify (and if needed discover) the phone for one candidate
    pub async fn verify(&self, candidate: &ContactCandidate) -> VerificationResult {
        let (name, company, linkedin) = Self::inputs(candidate);
        let raw = candidate.raw_value.trim();

        let value = if raw.is_empty() {
            let discoverable = self.stages.iter().any(|stage| match stage {
                PhoneStage::Discover(slot) => slot.provider.can_discover(name, company, linkedin),
                PhoneStage::Verify(_) => false,
            });
            if !discoverable {
                let attempt = SourceAttempt::new(FORMAT_STAGE, AttemptOutcome::Invalid, 0).with_detail("empty");
                return VerificationResult::rejected(candidate, vec![attempt]);
            }
            None
        } else {
            match normalize_phone(raw, &self.config.default_country_code) {
                Some(number) => Some(number),
                None => {
                    tracing::debug!(record_id = %candidate.record_id, "Malformed phone, skipping providers");
                    let attempt =
                        SourceAttempt::new(FORMAT_STAGE, AttemptOutcome::Invalid, 0).with_detail("malformed");
                    return VerificationResult::rejected(candidate, vec![attempt]);
                }
            }
        };

        let mut run = Run {
            attempts: Vec::new(),
            cost: 0.0,
            calls: 0,
            value,
            verified: None,
            discovered: None,
        };
        let mut deferred: Vec<&Slot<dyn PhoneVerifier>> = Vec::new();

        for stage in &self.stages {
            match stage {
                PhoneStage::Verify(slot) => {
                    if run.value.is_none() {
                        deferred.push(slot);
                        continue;
                    }
                    if let Some(confidence) = self.verify_step(slot, name, company, &mut run).await {
                        return self.finish(candidate, run, Some(confidence));
                    }
                }
                PhoneStage::Discover(slot) => {
                    if run.value.is_some() {
                        run.attempts.push(
                            SourceAttempt::new(slot.id(), AttemptOutcome::NoData, 0).with_detail("number in hand"),
                        );
                        continue;
                    }
                    if !slot.provider.can_discover(name, company, linkedin) {
                        run.attempts.push(
                            SourceAttempt::new(slot.id(), AttemptOutcome::NoData, 0)
                                .with_detail("insufficient input"),
                        );
                        continue;
                    }

                    self.pace(&mut run).await;
                    match slot.call(|p| p.discover_phone(name, company, linkedin)).await {
                        Ok(charged) => {
                            run.cost += charged.cost;
                            match charged.value {
                                Some(found) => {
                                    match normalize_phone(&found.value, &self.config.default_country_code) {
                                        Some(number) => {
                                            let confidence =
                                                found.confidence.unwrap_or(self.config.discovered_confidence);
                                            run.attempts.push(SourceAttempt::new(
                                                slot.id(),
                                                AttemptOutcome::Discovered,
                                                confidence,
                                            ));
                                            run.value = Some(number);
                                            run.discovered = Some(confidence);
                                        }
                                        None => run.attempts.push(
                                            SourceAttempt::new(slot.id(), AttemptOutcome::Invalid, 0)
                                                .with_detail("malformed result"),
                                        ),
                                    }
                                }
                                None => run
                                    .attempts
                                    .push(SourceAttempt::new(slot.id(), AttemptOutcome::NoData, 0)),
                            }
                        }
                        Err(e) => run.attempts.push(error_attempt(slot.id(), &e)),
                    }

                    // A fresh number goes through the verifiers that were waiting for one
                    while run.value.is_some() && !deferred.is_empty() {
                        let verifier = deferred.remove(0);
                        if let Some(confidence) = self.verify_step(verifier, name, company, &mut run).await {
                            return self.finish(candidate, run, Some(confidence));
                        }
                    }
                }
            }
        }

        for slot in deferred {
            run.attempts
                .push(SourceAttempt::new(slot.id(), AttemptOutcome::NoData, 0).with_detail("no number"));
        }
        self.finish(candidate, run, None)
    }

    /// Run one verify stage on the number in hand
    ///
    /// Returns the confidence when the stage confirms the number.
    async fn verify_step(
        &self,
        slot: &Slot<dyn PhoneVerifier>,
        name: Option<&str>,
        company: Option<&str>,
        run: &mut Run,
    ) -> Option<u8> {
        let owned = run.value.clone()?;
        let number: &str = &owned;
        self.pace(run).await;

        let step = match slot.call(|p| p.verify_phone(number, name, company)).await {
            Ok(charged) => {
                run.cost += charged.cost;
                match charged.value {
                    Some(verdict) if verdict.valid && verdict.confidence >= self.config.success_threshold => {
                        (VerifyStep::Confirmed(verdict.confidence), verdict.line_type)
                    }
                    Some(verdict) if verdict.valid => (VerifyStep::Partial(verdict.confidence), verdict.line_type),
                    Some(verdict) => (VerifyStep::Rejected, verdict.line_type),
                    None => (VerifyStep::NoEvidence, None),
                }
            }
            Err(e) => {
                run.attempts.push(error_attempt(slot.id(), &e));
                return None;
            }
        };

        let (step, line_type) = step;
        let (outcome, contribution) = match step {
            VerifyStep::Confirmed(c) => (AttemptOutcome::Confirmed, c),
            VerifyStep::Partial(c) => (AttemptOutcome::Partial, c),
            VerifyStep::Rejected => (AttemptOutcome::Invalid, 0),
            VerifyStep::NoEvidence => (AttemptOutcome::NoData, 0),
        };
        let mut attempt = SourceAttempt::new(slot.id(), outcome, contribution);
        if let Some(line_type) = line_type {
            attempt = attempt.with_detail(line_type);
        }
        run.attempts.push(attempt);

        match step {
            VerifyStep::Confirmed(c) => Some(c),
            VerifyStep::Partial(c) => {
                run.verified = Some(run.verified.map_or(c, |v| v.max(c)));
                None
            }
            VerifyStep::Rejected => {
                run.clear_value();
                None
            }
            VerifyStep::NoEvidence => None,
        }
    }

    /// Space provider calls to respect shared quotas
    async fn pace(&self, run: &mut Run) {
        if run.calls > 0 && self.config.phone_call_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.phone_call_delay_ms)).await;
        }
        run.calls += 1;
    }

    fn finish(&self, candidate: &ContactCandidate, run: Run, confirmed: Option<u8>) -> VerificationResult {
        let evidence = [confirmed, run.verified, run.discovered]
            .into_iter()
            .flatten()
            .max();

        let (valid, confidence) = match (&run.value, evidence) {
            (Some(_), Some(c)) => (true, c.min(100)),
            _ => (false, 0),
        };

        VerificationResult {
            record_id: candidate.record_id.clone(),
            field_kind: candidate.field_kind,
            final_value: run.value,
            valid,
            confidence,
            sources_attempted: run.attempts,
            cost_incurred: run.cost,
        }
    }
}
