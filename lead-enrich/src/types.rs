//! Core data model
//!
//! Input records, verification results, churn predictions, buyer-group outputs and
//! the field-level patch handed to the persistence boundary. Everything that crosses
//! that boundary serializes in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a person or company record in the host platform
pub type RecordId = String;

// ============================================================================
// Input records
// ============================================================================

/// One career-history entry as exported by the host platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpan {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    /// Free-form start date ("2021-03", "Mar 2021", "2021-03-15", "2021")
    #[serde(default)]
    pub start_date: Option<String>,
    /// Free-form end date; missing or "Present" means the role is current
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Person record supplied by the host platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRecord {
    pub id: RecordId,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_domain: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub career_history: Vec<RoleSpan>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub phone_verified: Option<bool>,
    #[serde(default)]
    pub churn_prediction: Option<ChurnPrediction>,
}

// ============================================================================
// Verification
// ============================================================================

/// Contact field being verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Email,
    Phone,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
        }
    }
}

/// One verification unit. Immutable input to the cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactCandidate {
    pub record_id: RecordId,
    pub field_kind: FieldKind,
    /// Value as stored in the host platform (may be empty)
    pub raw_value: String,
    pub associated_name: Option<String>,
    /// Company web domain ("acme.com")
    pub associated_domain: Option<String>,
    /// Company display name, used by phone providers
    pub associated_company: Option<String>,
    pub linkedin_url: Option<String>,
}

impl ContactCandidate {
    /// Email candidate
    pub fn email(
        record_id: impl Into<RecordId>,
        raw_value: impl Into<String>,
        name: Option<String>,
        domain: Option<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            field_kind: FieldKind::Email,
            raw_value: raw_value.into(),
            associated_name: name,
            associated_domain: domain,
            associated_company: None,
            linkedin_url: None,
        }
    }

    /// Phone candidate
    pub fn phone(
        record_id: impl Into<RecordId>,
        raw_value: impl Into<String>,
        name: Option<String>,
        company: Option<String>,
        linkedin_url: Option<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            field_kind: FieldKind::Phone,
            raw_value: raw_value.into(),
            associated_name: name,
            associated_domain: None,
            associated_company: company,
            linkedin_url,
        }
    }

    /// Build both candidates for a person record
    pub fn from_person(record: &PersonRecord) -> (Self, Self) {
        let email = Self::email(
            record.id.clone(),
            record.email.clone().unwrap_or_default(),
            record.full_name.clone(),
            record.company_domain.clone(),
        );
        let phone = Self::phone(
            record.id.clone(),
            record.phone.clone().unwrap_or_default(),
            record.full_name.clone(),
            record.company_name.clone(),
            record.linkedin_url.clone(),
        );
        (email, phone)
    }
}

/// What happened at one cascade stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Stage confirmed the value (may terminate the cascade)
    Confirmed,
    /// Stage produced a partial signal (catch-all, unknown, heuristic)
    Partial,
    /// Stage rejected the value
    Invalid,
    /// Discovery stage produced a new candidate value
    Discovered,
    /// Provider answered but had nothing
    NoData,
    /// Provider call timed out (treated as skip)
    Timeout,
    /// Skipped before calling: provider near its daily quota
    QuotaSkipped,
    /// Skipped before calling: run budget exhausted
    BudgetSkipped,
    /// Skipped: provider disabled after an auth failure
    Disabled,
    /// Provider returned an error
    Failed,
}

impl AttemptOutcome {
    /// Skipped for quota or cost reasons
    pub fn is_limit_skip(&self) -> bool {
        matches!(self, AttemptOutcome::QuotaSkipped | AttemptOutcome::BudgetSkipped)
    }

    /// Stage did not produce any evidence
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Timeout
                | AttemptOutcome::QuotaSkipped
                | AttemptOutcome::BudgetSkipped
                | AttemptOutcome::Disabled
                | AttemptOutcome::Failed
        )
    }
}

/// One entry of `sources_attempted`, in call order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttempt {
    pub provider_id: String,
    pub outcome: AttemptOutcome,
    pub confidence_contribution: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SourceAttempt {
    pub fn new(provider_id: impl Into<String>, outcome: AttemptOutcome, contribution: u8) -> Self {
        Self {
            provider_id: provider_id.into(),
            outcome,
            confidence_contribution: contribution.min(100),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Cascade output. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub record_id: RecordId,
    pub field_kind: FieldKind,
    pub final_value: Option<String>,
    pub valid: bool,
    /// 0-100
    pub confidence: u8,
    pub sources_attempted: Vec<SourceAttempt>,
    pub cost_incurred: f64,
}

impl VerificationResult {
    /// Zero-cost result for empty or malformed input
    pub fn rejected(candidate: &ContactCandidate, attempts: Vec<SourceAttempt>) -> Self {
        Self {
            record_id: candidate.record_id.clone(),
            field_kind: candidate.field_kind,
            final_value: None,
            valid: false,
            confidence: 0,
            sources_attempted: attempts,
            cost_incurred: 0.0,
        }
    }

    /// True if any stage was skipped for quota or budget reasons
    pub fn limit_skipped(&self) -> bool {
        self.sources_attempted.iter().any(|a| a.outcome.is_limit_skip())
    }
}

// ============================================================================
// Churn
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTier {
    Daily,
    Weekly,
    Monthly,
}

impl RefreshTier {
    /// Days until the next scheduled refresh
    pub fn interval_days(&self) -> i64 {
        match self {
            RefreshTier::Daily => 1,
            RefreshTier::Weekly => 7,
            RefreshTier::Monthly => 30,
        }
    }
}

/// Departure prediction for one person. Superseded, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnPrediction {
    pub record_id: RecordId,
    pub average_tenure_months: f64,
    pub current_tenure_months: f64,
    pub predicted_departure_months: f64,
    pub completed_roles: usize,
    /// 0-100
    pub risk_score: u8,
    pub risk_tier: RiskTier,
    pub refresh_tier: RefreshTier,
    pub next_refresh_at: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
    pub reasoning: String,
}

// ============================================================================
// Buyer group
// ============================================================================

/// Company attributes returned by the company data provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmographics {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    /// Year-over-year headcount growth in percent
    #[serde(default)]
    pub headcount_growth_pct: Option<f64>,
    /// Active job postings
    #[serde(default)]
    pub open_jobs: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Raw company search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub company_id: RecordId,
    pub firmographics: Firmographics,
}

/// Raw employee record from the people provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    pub person_id: RecordId,
    pub company_id: RecordId,
    pub full_name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Department as reported by the provider, if any
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub connections: Option<u32>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMethod {
    Generative,
    RuleBased,
}

impl ScoringMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMethod::Generative => "generative",
            ScoringMethod::RuleBased => "rule-based",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Executive,
    Sales,
    Marketing,
    Product,
    Engineering,
    Operations,
    Finance,
    Hr,
    Legal,
    CustomerSuccess,
    Other,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Executive => "executive",
            Department::Sales => "sales",
            Department::Marketing => "marketing",
            Department::Product => "product",
            Department::Engineering => "engineering",
            Department::Operations => "operations",
            Department::Finance => "finance",
            Department::Hr => "hr",
            Department::Legal => "legal",
            Department::CustomerSuccess => "customer_success",
            Department::Other => "other",
        }
    }
}

/// Seniority, ordered from most to least senior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seniority {
    Executive,
    Director,
    Manager,
    Individual,
    Entry,
}

/// Sampled employee with inferred department and seniority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSample {
    pub person_id: RecordId,
    pub company_id: RecordId,
    pub full_name: String,
    pub title: Option<String>,
    pub department: Department,
    pub seniority: Seniority,
    pub connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerRole {
    Decision,
    Influencer,
    User,
    Blocker,
    Unknown,
}

/// Buyer-group tag for one person/company pair. Overwritten on each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerGroupMembership {
    pub person_id: RecordId,
    pub company_id: RecordId,
    pub role: BuyerRole,
    pub in_buyer_group: bool,
    /// 0-100
    pub confidence: u8,
    pub reasoning: String,
}

/// Scored company with its sampled employees. Read-only once scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyCandidate {
    pub company_id: RecordId,
    pub firmographics: Firmographics,
    /// 0-100
    pub readiness_score: u8,
    pub scoring_method: ScoringMethod,
    pub rationale: String,
    pub sampled_employees: Vec<EmployeeSample>,
}

// ============================================================================
// Cost
// ============================================================================

/// Cost bucket a provider call is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    /// Company/people search credits
    Search,
    /// Record collect credits
    Collect,
    Email,
    Phone,
    /// Generative scoring/classification
    Scoring,
}

/// Accumulated cost per category (USD or credits, per provider config)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTotals {
    pub search: f64,
    pub collect: f64,
    pub email: f64,
    pub phone: f64,
    #[serde(default)]
    pub scoring: f64,
}

impl CostTotals {
    pub fn add(&mut self, category: CostCategory, amount: f64) {
        match category {
            CostCategory::Search => self.search += amount,
            CostCategory::Collect => self.collect += amount,
            CostCategory::Email => self.email += amount,
            CostCategory::Phone => self.phone += amount,
            CostCategory::Scoring => self.scoring += amount,
        }
    }

    pub fn merge(&mut self, other: &CostTotals) {
        self.search += other.search;
        self.collect += other.collect;
        self.email += other.email;
        self.phone += other.phone;
        self.scoring += other.scoring;
    }

    pub fn total(&self) -> f64 {
        self.search + self.collect + self.email + self.phone + self.scoring
    }
}

// ============================================================================
// Write-back
// ============================================================================

/// Company readiness as written back to the company record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerReadiness {
    pub score: u8,
    pub method: ScoringMethod,
    pub rationale: String,
}

/// Field-level patch for one record. Absent fields are left untouched by the sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
    pub record_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub churn_prediction: Option<ChurnPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_group_membership: Option<BuyerGroupMembership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_readiness: Option<BuyerReadiness>,
}

impl FieldPatch {
    pub fn new(record_id: impl Into<RecordId>) -> Self {
        Self {
            record_id: record_id.into(),
            ..Default::default()
        }
    }

    /// Fill the email or phone fields from a verification result
    pub fn apply_verification(&mut self, result: &VerificationResult) {
        match result.field_kind {
            FieldKind::Email => {
                if result.valid {
                    self.email = result.final_value.clone();
                }
                self.email_verified = Some(result.valid);
                self.email_confidence = Some(result.confidence);
            }
            FieldKind::Phone => {
                if result.valid {
                    self.phone = result.final_value.clone();
                }
                self.phone_verified = Some(result.valid);
                self.phone_confidence = Some(result.confidence);
            }
        }
    }

    /// Field map without the record id, for merge-style writes
    pub fn fields_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(map) = value.as_object_mut() {
            map.remove("recordId");
        }
        value
    }

    /// No field set
    pub fn is_empty(&self) -> bool {
        self.fields_json()
            .as_object()
            .map(|m| m.is_empty())
            .unwrap_or(true)
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Which pipeline a batch runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Contacts,
    Churn,
    BuyerGroup,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Contacts => "contacts",
            BatchKind::Churn => "churn",
            BatchKind::BuyerGroup => "buyer_group",
        }
    }
}

/// Terminal classification of one processed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// At least one field verified, or a prediction/tag was produced
    Verified,
    /// Attempted but nothing could be confirmed
    Unresolved,
    /// Nothing confirmed and at least one stage skipped for quota or cost
    QuotaSkipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_omits_absent_fields() {
        let mut patch = FieldPatch::new("p-1");
        patch.email_verified = Some(true);
        patch.email_confidence = Some(92);

        let fields = patch.fields_json();
        let map = fields.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["emailVerified"], true);
        assert_eq!(map["emailConfidence"], 92);
        assert!(!map.contains_key("recordId"));
        assert!(!map.contains_key("phone"));
    }

    #[test]
    fn test_empty_patch() {
        assert!(FieldPatch::new("p-2").is_empty());
    }

    #[test]
    fn test_invalid_verification_keeps_stored_value() {
        let result = VerificationResult {
            record_id: "p-3".to_string(),
            field_kind: FieldKind::Phone,
            final_value: Some("+15550100".to_string()),
            valid: false,
            confidence: 0,
            sources_attempted: vec![],
            cost_incurred: 0.0,
        };
        let mut patch = FieldPatch::new("p-3");
        patch.apply_verification(&result);

        assert_eq!(patch.phone, None);
        assert_eq!(patch.phone_verified, Some(false));
        assert_eq!(patch.phone_confidence, Some(0));
    }

    #[test]
    fn test_cost_totals_merge() {
        let mut a = CostTotals::default();
        a.add(CostCategory::Email, 0.5);
        a.add(CostCategory::Search, 2.0);
        let mut b = CostTotals::default();
        b.add(CostCategory::Email, 0.25);
        b.add(CostCategory::Scoring, 1.0);

        a.merge(&b);
        assert_eq!(a.email, 0.75);
        assert_eq!(a.total(), 3.75);
    }

    #[test]
    fn test_person_record_camel_case() {
        let json = r#"{"id":"p-9","fullName":"Dana Reyes","companyDomain":"acme.com",
            "careerHistory":[{"title":"AE","startDate":"2020-01","endDate":"Present"}]}"#;
        let record: PersonRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.full_name.as_deref(), Some("Dana Reyes"));
        assert_eq!(record.career_history.len(), 1);
        assert_eq!(record.career_history[0].end_date.as_deref(), Some("Present"));
    }

    #[test]
    fn test_scoring_method_wire_name() {
        let json = serde_json::to_string(&ScoringMethod::RuleBased).unwrap();
        assert_eq!(json, "\"rule-based\"");
    }
}
