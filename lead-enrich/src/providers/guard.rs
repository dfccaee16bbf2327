//! Provider guard
//!
//! The single place where call policy lives: disabled check, quota and budget
//! admission, token-bucket rate limiting, the per-call timeout, retries for
//! transient failures, and cost accounting. Cascades and scorers call through a
//! guard and never retry on their own.

use super::ProviderError;
use crate::ledger::{CostLedger, Refusal};
use crate::types::CostCategory;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use lead_common::{EnrichEvent, EventBus};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Backoff for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, with up to 50% added jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let base = exp.min(self.max_backoff);
        let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 2));
        base + Duration::from_millis(jitter_ms)
    }
}

/// A successful call and what it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Charged<T> {
    pub value: T,
    pub cost: f64,
}

/// Per-provider call policy, shared by every capability of that provider
pub struct ProviderGuard {
    id: String,
    ledger: Arc<CostLedger>,
    events: EventBus,
    limiter: DirectLimiter,
    timeout: Duration,
    retry: RetryPolicy,
    daily_quota: Option<u32>,
    quota_headroom: u32,
    disabled: AtomicBool,
}

impl ProviderGuard {
    /// # Arguments
    /// * `id` - Provider id used in logs, events and `sources_attempted`
    /// * `rate_per_second` - Token-bucket rate (0 is treated as 1)
    /// * `timeout` - Hard limit on a single call
    pub fn new(
        id: impl Into<String>,
        ledger: Arc<CostLedger>,
        events: EventBus,
        rate_per_second: u32,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let rate = NonZeroU32::new(rate_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            id: id.into(),
            ledger,
            events,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            timeout,
            retry,
            daily_quota: None,
            quota_headroom: 0,
            disabled: AtomicBool::new(false),
        }
    }

    /// Daily call quota and the headroom at which the provider is skipped
    pub fn with_quota(mut self, daily_quota: Option<u32>, headroom: u32) -> Self {
        self.daily_quota = daily_quota;
        self.quota_headroom = headroom;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Switch the provider off for the rest of the run. Logged once.
    pub fn disable(&self, reason: &str) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                provider = %self.id,
                reason,
                "Provider disabled for the rest of the run"
            );
            self.events.emit_lossy(EnrichEvent::ProviderDisabled {
                provider: self.id.clone(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    fn admit(&self, cost: f64) -> Result<(), ProviderError> {
        match self
            .ledger
            .admit(&self.id, self.daily_quota, self.quota_headroom, cost)
        {
            Ok(()) => Ok(()),
            Err(Refusal::Quota) => {
                tracing::debug!(provider = %self.id, "Skipping call: daily quota reached");
                Err(ProviderError::QuotaExceeded)
            }
            Err(Refusal::Budget) => {
                tracing::debug!(provider = %self.id, "Skipping call: run budget exhausted");
                Err(ProviderError::BudgetExhausted)
            }
        }
    }

    /// Run `operation` under this provider's policy
    ///
    /// # Returns
    /// The value and the cost charged, or the error of the last attempt.
    /// Quota, budget and disabled refusals are returned without calling.
    pub async fn call<F, Fut, R>(
        &self,
        category: CostCategory,
        cost: f64,
        mut operation: F,
    ) -> Result<Charged<R>, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<R, ProviderError>>,
    {
        if self.is_disabled() {
            return Err(ProviderError::Disabled);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            // Every attempt, retries included, must fit the quota and budget
            self.admit(cost)?;
            self.limiter.until_ready().await;

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, operation()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let err = match outcome {
                Err(_) => {
                    tracing::debug!(provider = %self.id, elapsed_ms, "Provider call timed out");
                    return Err(ProviderError::Timeout(self.timeout));
                }
                Ok(Ok(value)) => {
                    self.ledger.record_charge(&self.id, category, cost);
                    tracing::trace!(provider = %self.id, elapsed_ms, cost, "Provider call succeeded");
                    return Ok(Charged { value, cost });
                }
                Ok(Err(err)) => err,
            };

            match &err {
                ProviderError::Auth(reason) => {
                    self.disable(reason);
                    return Err(err);
                }
                ProviderError::Timeout(_) => return Err(err),
                ProviderError::Api(..) | ProviderError::RateLimited => {
                    // Vendor saw the request; it counts toward the daily quota.
                    self.ledger.record_uncharged(&self.id);
                }
                _ => {}
            }

            if !err.is_transient() || attempt >= self.retry.max_attempts {
                tracing::debug!(
                    provider = %self.id,
                    attempt,
                    error = %err,
                    "Provider call failed"
                );
                return Err(err);
            }

            let backoff = self.retry.backoff(attempt);
            tracing::debug!(
                provider = %self.id,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Transient provider failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
