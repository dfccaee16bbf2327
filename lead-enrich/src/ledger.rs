//! Cost ledger
//!
//! Run-wide cost per category, per-provider call counts, per-UTC-day usage for
//! quota checks, and the optional run budget. This is the only mutable state
//! shared across workers. Updates happen after a provider call returns.

use crate::types::{CostCategory, CostTotals};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Why the ledger refused a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Provider's daily quota is used up
    Quota,
    /// Run budget would be exceeded
    Budget,
}

/// Usage of one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    /// Successful (charged) calls this run
    pub calls: u64,
    /// Cost charged this run
    pub cost: f64,
    /// Calls counted against today's quota
    pub day_calls: u32,
    #[serde(skip)]
    day: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct LedgerState {
    totals: CostTotals,
    providers: BTreeMap<String, ProviderUsage>,
}

#[derive(Debug, Default)]
pub struct CostLedger {
    state: Mutex<LedgerState>,
    budget: Option<f64>,
}

impl CostLedger {
    pub fn new(budget: Option<f64>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            budget,
        }
    }

    /// Start from the cumulative cost of a resumed checkpoint
    pub fn seeded(budget: Option<f64>, totals: CostTotals) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                totals,
                providers: BTreeMap::new(),
            }),
            budget,
        }
    }

    /// Add the cumulative cost of a resumed checkpoint to the running totals
    ///
    /// Anything charged before the checkpoint was loaded is kept.
    pub fn seed(&self, totals: CostTotals) {
        self.lock().totals.merge(&totals);
    }

    /// Check whether a call of `cost` to `provider` may be made now
    ///
    /// `headroom` skips the provider while it is within that many calls of its quota.
    pub fn admit(
        &self,
        provider: &str,
        daily_quota: Option<u32>,
        headroom: u32,
        cost: f64,
    ) -> Result<(), Refusal> {
        self.admit_on(Utc::now().date_naive(), provider, daily_quota, headroom, cost)
    }

    fn admit_on(
        &self,
        today: NaiveDate,
        provider: &str,
        daily_quota: Option<u32>,
        headroom: u32,
        cost: f64,
    ) -> Result<(), Refusal> {
        let mut state = self.lock();

        if let Some(quota) = daily_quota {
            let usage = state.providers.entry(provider.to_string()).or_default();
            roll_day(usage, today);
            if usage.day_calls.saturating_add(headroom) >= quota {
                return Err(Refusal::Quota);
            }
        }

        if let Some(budget) = self.budget {
            if cost > 0.0 && state.totals.total() + cost > budget + f64::EPSILON {
                return Err(Refusal::Budget);
            }
        }

        Ok(())
    }

    /// Charge a successful call
    pub fn record_charge(&self, provider: &str, category: CostCategory, cost: f64) {
        self.record_charge_on(Utc::now().date_naive(), provider, category, cost)
    }

    fn record_charge_on(&self, today: NaiveDate, provider: &str, category: CostCategory, cost: f64) {
        let mut state = self.lock();
        state.totals.add(category, cost);
        let usage = state.providers.entry(provider.to_string()).or_default();
        roll_day(usage, today);
        usage.calls += 1;
        usage.cost += cost;
        usage.day_calls = usage.day_calls.saturating_add(1);
    }

    /// Count a call against the daily quota without charging it
    pub fn record_uncharged(&self, provider: &str) {
        let today = Utc::now().date_naive();
        let mut state = self.lock();
        let usage = state.providers.entry(provider.to_string()).or_default();
        roll_day(usage, today);
        usage.day_calls = usage.day_calls.saturating_add(1);
    }

    pub fn totals(&self) -> CostTotals {
        self.lock().totals
    }

    /// Running total across all categories
    pub fn total(&self) -> f64 {
        self.lock().totals.total()
    }

    pub fn budget(&self) -> Option<f64> {
        self.budget
    }

    pub fn provider_usage(&self, provider: &str) -> Option<ProviderUsage> {
        self.lock().providers.get(provider).cloned()
    }

    pub fn usage_snapshot(&self) -> BTreeMap<String, ProviderUsage> {
        self.lock().providers.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // Poisoning only means another worker panicked mid-update; the counters are still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn roll_day(usage: &mut ProviderUsage, today: NaiveDate) {
    if usage.day != Some(today) {
        usage.day = Some(today);
        usage.day_calls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_charges_accumulate_per_category() {
        let ledger = CostLedger::new(None);
        ledger.record_charge("zerobounce", CostCategory::Email, 0.01);
        ledger.record_charge("zerobounce", CostCategory::Email, 0.01);
        ledger.record_charge("coresignal", CostCategory::Search, 2.0);

        let totals = ledger.totals();
        assert!((totals.email - 0.02).abs() < 1e-9);
        assert_eq!(totals.search, 2.0);
        assert_eq!(ledger.provider_usage("zerobounce").unwrap().calls, 2);
    }

    #[test]
    fn test_quota_refusal_and_daily_rollover() {
        let ledger = CostLedger::new(None);
        ledger.record_charge_on(day(1), "lusha", CostCategory::Phone, 0.0);
        ledger.record_charge_on(day(1), "lusha", CostCategory::Phone, 0.0);

        assert_eq!(ledger.admit_on(day(1), "lusha", Some(2), 0, 0.0), Err(Refusal::Quota));
        assert_eq!(ledger.admit_on(day(2), "lusha", Some(2), 0, 0.0), Ok(()));
    }

    #[test]
    fn test_quota_headroom() {
        let ledger = CostLedger::new(None);
        ledger.record_charge_on(day(1), "twilio", CostCategory::Phone, 0.0);

        assert_eq!(ledger.admit_on(day(1), "twilio", Some(3), 1, 0.0), Ok(()));
        assert_eq!(ledger.admit_on(day(1), "twilio", Some(3), 2, 0.0), Err(Refusal::Quota));
    }

    #[test]
    fn test_budget_refusal() {
        let ledger = CostLedger::new(Some(1.0));
        ledger.record_charge("prospeo", CostCategory::Email, 0.9);

        assert_eq!(ledger.admit("prospeo", None, 0, 0.2), Err(Refusal::Budget));
        assert_eq!(ledger.admit("prospeo", None, 0, 0.1), Ok(()));
        assert_eq!(ledger.admit("syntax", None, 0, 0.0), Ok(()));
    }

    #[test]
    fn test_seeded_totals_count_toward_budget() {
        let mut seed = CostTotals::default();
        seed.add(CostCategory::Collect, 5.0);
        let ledger = CostLedger::seeded(Some(5.0), seed);

        assert_eq!(ledger.total(), 5.0);
        assert_eq!(ledger.admit("coresignal", None, 0, 1.0), Err(Refusal::Budget));
    }

    #[test]
    fn test_seed_adds_to_earlier_charges() {
        let ledger = CostLedger::new(None);
        ledger.record_charge("coresignal", CostCategory::Search, 0.2);

        let mut snapshot = CostTotals::default();
        snapshot.add(CostCategory::Search, 1.0);
        ledger.seed(snapshot);

        assert!((ledger.totals().search - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_uncharged_calls_count_toward_quota() {
        let ledger = CostLedger::new(None);
        ledger.record_uncharged("pdl");

        let usage = ledger.provider_usage("pdl").unwrap();
        assert_eq!(usage.calls, 0);
        assert_eq!(usage.day_calls, 1);
        assert_eq!(ledger.total(), 0.0);
    }
}
