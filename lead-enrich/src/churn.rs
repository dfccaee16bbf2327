//! Churn risk calculator
//!
//! Pure function from a career timeline to a departure-risk score and refresh
//! tier. Recomputing always yields a complete prediction that replaces the
//! previous one.

use crate::config::ChurnConfig;
use crate::types::{ChurnPrediction, RecordId, RefreshTier, RiskTier, RoleSpan};
use chrono::{DateTime, Duration, NaiveDate, Utc};

const DAYS_PER_MONTH: f64 = 30.4375;

/// Durations derived from a career history
#[derive(Debug, Clone, PartialEq)]
pub struct Tenure {
    /// Completed roles, oldest first
    pub prior_months: Vec<f64>,
    pub current_months: f64,
}

/// Parse a free-form role date
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `Mon YYYY` and `Month YYYY`.
/// Returns `None` for "Present" and anything unparseable.
pub fn parse_role_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() || is_open_ended(text) {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d") {
        return Some(date);
    }
    if text.len() == 4 {
        if let Ok(year) = text.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    let dated = format!("1 {}", text);
    NaiveDate::parse_from_str(&dated, "%d %b %Y")
        .or_else(|_| NaiveDate::parse_from_str(&dated, "%d %B %Y"))
        .ok()
}

fn is_open_ended(text: &str) -> bool {
    matches!(text.to_lowercase().as_str(), "present" | "current" | "now")
}

fn months_between(start: NaiveDate, end: NaiveDate) -> f64 {
    ((end - start).num_days().max(0) as f64) / DAYS_PER_MONTH
}

/// Derive completed-role durations and current tenure from dated spans
///
/// The open-ended span with the latest start is the current role. Spans
/// without a parseable start are ignored. Returns `None` when nothing is dated.
pub fn tenure_from_history(history: &[RoleSpan], now: DateTime<Utc>) -> Option<Tenure> {
    let today = now.date_naive();

    let mut spans: Vec<(NaiveDate, Option<NaiveDate>)> = history
        .iter()
        .filter_map(|span| {
            let start = span.start_date.as_deref().and_then(parse_role_date)?;
            let end = span.end_date.as_deref().and_then(parse_role_date);
            Some((start, end))
        })
        .collect();

    if spans.is_empty() {
        return None;
    }
    spans.sort_by_key(|(start, _)| *start);

    let current_idx = spans
        .iter()
        .enumerate()
        .filter(|(_, (_, end))| end.is_none())
        .map(|(i, _)| i)
        .last();

    let current_months = current_idx
        .map(|i| months_between(spans[i].0, today))
        .unwrap_or(0.0);

    let prior_months = spans
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != current_idx)
        .map(|(_, (start, end))| months_between(*start, end.unwrap_or(today)))
        .collect();

    Some(Tenure {
        prior_months,
        current_months,
    })
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct ChurnCalculator {
    config: ChurnConfig,
}

impl ChurnCalculator {
    pub fn new(config: ChurnConfig) -> Self {
        Self { config }
    }

    /// Score on the base curve for `ratio = current / average`
    fn base_curve(&self, ratio: f64) -> f64 {
        let c = &self.config;
        if ratio <= c.low_ratio {
            c.base_score
        } else if ratio < c.mid_ratio {
            c.base_score + (c.mid_score - c.base_score) * (ratio - c.low_ratio) / (c.mid_ratio - c.low_ratio)
        } else if ratio < 1.0 {
            c.mid_score + (c.at_average_score - c.mid_score) * (ratio - c.mid_ratio) / (1.0 - c.mid_ratio)
        } else {
            c.at_average_score + (c.overdue_slope * (ratio - 1.0)).min(c.overdue_max_bonus)
        }
    }

    fn mover_bonus(&self, completed_roles: usize) -> f64 {
        if completed_roles >= 5 {
            self.config.serial_mover_bonus
        } else if completed_roles >= 3 {
            self.config.frequent_mover_bonus
        } else {
            0.0
        }
    }

    fn tiers(&self, score: u8, predicted_months: f64) -> (RiskTier, RefreshTier) {
        let c = &self.config;
        if score >= c.high_score || predicted_months <= c.high_predicted_months {
            (RiskTier::High, RefreshTier::Daily)
        } else if score >= c.medium_score || predicted_months <= c.medium_predicted_months {
            (RiskTier::Medium, RefreshTier::Weekly)
        } else {
            (RiskTier::Low, RefreshTier::Monthly)
        }
    }

    /// Predict departure risk from completed-role durations and current tenure
    pub fn predict(
        &self,
        record_id: impl Into<RecordId>,
        prior_months: &[f64],
        current_months: f64,
        now: DateTime<Utc>,
    ) -> ChurnPrediction {
        let completed: Vec<f64> = prior_months
            .iter()
            .copied()
            .filter(|m| m.is_finite() && *m >= 0.0)
            .collect();
        let current = if current_months.is_finite() { current_months.max(0.0) } else { 0.0 };

        let computed_average = completed.iter().sum::<f64>() / completed.len().max(1) as f64;
        let uses_default = completed.is_empty() || computed_average <= 0.0;
        let average = if uses_default {
            self.config.default_average_tenure_months
        } else {
            computed_average
        };

        let predicted = (average - current).max(0.0);
        let ratio = if average > 0.0 { current / average } else { 0.0 };
        let raw = self.base_curve(ratio) + self.mover_bonus(completed.len());
        let score = raw.round().clamp(0.0, 100.0) as u8;
        let (risk_tier, refresh_tier) = self.tiers(score, predicted);

        let mut reasoning = format!(
            "current tenure {:.1} months vs average {:.1}",
            current, average
        );
        if uses_default {
            reasoning.push_str(" (industry default, no completed prior roles; lower confidence)");
        } else {
            reasoning.push_str(&format!(" across {} prior roles", completed.len()));
        }
        if predicted <= 0.0 {
            reasoning.push_str("; past typical departure point");
        } else {
            reasoning.push_str(&format!("; ~{:.0} months to typical departure", predicted));
        }

        ChurnPrediction {
            record_id: record_id.into(),
            average_tenure_months: round1(average),
            current_tenure_months: round1(current),
            predicted_departure_months: round1(predicted),
            completed_roles: completed.len(),
            risk_score: score,
            risk_tier,
            refresh_tier,
            next_refresh_at: now + Duration::days(refresh_tier.interval_days()),
            computed_at: now,
            reasoning,
        }
    }

    /// Predict from a dated career history; `None` when no span is dated
    pub fn predict_from_history(
        &self,
        record_id: impl Into<RecordId>,
        history: &[RoleSpan],
        now: DateTime<Utc>,
    ) -> Option<ChurnPrediction> {
        let tenure = tenure_from_history(history, now)?;
        Some(self.predict(record_id, &tenure.prior_months, tenure.current_months, now))
    }
}

impl Default for ChurnCalculator {
    fn default() -> Self {
        Self::new(ChurnConfig::default())
    }
}

/// True when a stored prediction is still inside its refresh window
pub fn is_fresh(prediction: &ChurnPrediction, now: DateTime<Utc>) -> bool {
    prediction.next_refresh_at > now
}
