//! Anthropic Messages API client: generative company scoring and buyer-group
//! classification
//!
//! The model is asked for strict JSON; anything that does not parse is a
//! `Parse` error, which sends the caller to its rule-based fallback.

use super::http::{build_client, check_status, json, transport_error};
use super::{BuyerGroupClassifier, ClassificationContext, CompanyScore, CompanyScorer, ProviderError};
use crate::buyer_group::criteria::BuyerCriteria;
use crate::types::{BuyerGroupMembership, BuyerRole, EmployeeSample, Firmographics};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

const SCORE_SYSTEM: &str = "You qualify B2B target accounts. Reply with a single JSON object \
{\"score\": <integer 0-100>, \"rationale\": \"<one or two sentences>\"} and nothing else.";

const CLASSIFY_SYSTEM: &str = "You map employees of a target account to buyer-group roles. \
Roles: decision, influencer, user, blocker, unknown. Reply with a JSON array of objects \
{\"personId\", \"role\", \"inBuyerGroup\", \"confidence\" (0-100), \"reasoning\"}, one per \
employee, and nothing else.";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f64,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipReply {
    person_id: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    in_buyer_group: bool,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: String,
}

pub struct AnthropicClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
        })
    }

    /// One single-turn request, returning the concatenated text blocks
    async fn complete(&self, system: &str, prompt: String) -> Result<String, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0,
            "system": system,
            "messages": [ { "role": "user", "content": prompt } ],
        });

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let reply: MessagesResponse = json(check_status(response).await?).await?;

        let text: String = reply
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.trim().is_empty() {
            return Err(ProviderError::Parse("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Slice out the outermost JSON value delimited by `open`/`close`
fn extract_json(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn parse_role(role: Option<&str>) -> BuyerRole {
    match role.map(|r| r.trim().to_lowercase()).as_deref() {
        Some("decision") | Some("decision_maker") | Some("decision-maker") => BuyerRole::Decision,
        Some("influencer") | Some("champion") => BuyerRole::Influencer,
        Some("user") | Some("stakeholder") => BuyerRole::User,
        Some("blocker") => BuyerRole::Blocker,
        _ => BuyerRole::Unknown,
    }
}

fn score_prompt(criteria: &BuyerCriteria, firmographics: &Firmographics) -> String {
    format!(
        "Qualification criteria:\n{}\n\nCompany:\n{}\n\nHow ready is this company to buy?",
        serde_json::to_string_pretty(criteria).unwrap_or_default(),
        serde_json::to_string_pretty(firmographics).unwrap_or_default()
    )
}

fn classify_prompt(samples: &[EmployeeSample], context: &ClassificationContext) -> String {
    format!(
        "Company {} ({}):\n{}\n\nCriteria:\n{}\n\nEmployees:\n{}",
        context.company_id,
        context.firmographics.name,
        serde_json::to_string_pretty(&context.firmographics).unwrap_or_default(),
        serde_json::to_string_pretty(&context.criteria).unwrap_or_default(),
        serde_json::to_string_pretty(samples).unwrap_or_default()
    )
}

#[async_trait]
impl CompanyScorer for AnthropicClient {
    async fn score_company(
        &self,
        criteria: &BuyerCriteria,
        firmographics: &Firmographics,
    ) -> Result<CompanyScore, ProviderError> {
        let text = self.complete(SCORE_SYSTEM, score_prompt(criteria, firmographics)).await?;
        let raw = extract_json(&text, '{', '}')
            .ok_or_else(|| ProviderError::Parse("no JSON object in reply".to_string()))?;
        let reply: ScoreReply =
            serde_json::from_str(raw).map_err(|e| ProviderError::Parse(e.to_string()))?;

        if !reply.score.is_finite() {
            return Err(ProviderError::Parse("non-numeric score".to_string()));
        }

        Ok(CompanyScore {
            score: reply.score.round().clamp(0.0, 100.0) as u8,
            rationale: reply.rationale,
        })
    }
}

#[async_trait]
impl BuyerGroupClassifier for AnthropicClient {
    async fn classify_buyer_group(
        &self,
        samples: &[EmployeeSample],
        context: &ClassificationContext,
    ) -> Result<Vec<BuyerGroupMembership>, ProviderError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let text = self
            .complete(CLASSIFY_SYSTEM, classify_prompt(samples, context))
            .await?;
        let raw = extract_json(&text, '[', ']')
            .ok_or_else(|| ProviderError::Parse("no JSON array in reply".to_string()))?;
        let replies: Vec<MembershipReply> =
            serde_json::from_str(raw).map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(replies
            .into_iter()
            .map(|r| BuyerGroupMembership {
                person_id: r.person_id,
                company_id: context.company_id.clone(),
                role: parse_role(r.role.as_deref()),
                in_buyer_group: r.in_buyer_group,
                confidence: r.confidence.unwrap_or(50.0).round().clamp(0.0, 100.0) as u8,
                reasoning: r.reasoning,
            })
            .collect())
    }
}
