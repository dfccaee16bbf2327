//! Verification cascades
//!
//! One cascade per contact field. A cascade never fails: provider errors are
//! recorded in `sources_attempted` and the next stage runs. All call policy
//! (retries, quota, budget, timeouts) lives in the provider guard.

pub mod email;
pub mod phone;

pub use email::EmailCascade;
pub use phone::PhoneCascade;

use crate::providers::ProviderError;
use crate::types::{AttemptOutcome, SourceAttempt};

/// Outcome recorded for a failed or refused call
pub(crate) fn error_outcome(err: &ProviderError) -> AttemptOutcome {
    match err {
        ProviderError::Timeout(_) => AttemptOutcome::Timeout,
        ProviderError::QuotaExceeded => AttemptOutcome::QuotaSkipped,
        ProviderError::BudgetExhausted => AttemptOutcome::BudgetSkipped,
        ProviderError::Disabled => AttemptOutcome::Disabled,
        _ => AttemptOutcome::Failed,
    }
}

pub(crate) fn error_attempt(provider_id: &str, err: &ProviderError) -> SourceAttempt {
    SourceAttempt::new(provider_id, error_outcome(err), 0).with_detail(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_outcomes() {
        assert_eq!(
            error_outcome(&ProviderError::Timeout(Duration::from_secs(30))),
            AttemptOutcome::Timeout
        );
        assert_eq!(error_outcome(&ProviderError::QuotaExceeded), AttemptOutcome::QuotaSkipped);
        assert_eq!(error_outcome(&ProviderError::Auth("x".into())), AttemptOutcome::Failed);
        assert!(error_attempt("lusha", &ProviderError::Disabled).outcome.is_skip());
    }
}
