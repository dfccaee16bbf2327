//! ZeroBounce email validation client (primary SMTP verifier)

use super::http::{build_client, check_status, json, transport_error};
use super::{EmailStatus, EmailVerdict, EmailVerifier, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.zerobounce.net";

/// Confidence reported for a `valid` verdict
const VALID_CONFIDENCE: u8 = 95;

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    sub_status: Option<String>,
    #[serde(default)]
    free_email: Option<bool>,
    /// Present instead of a verdict when the request itself was rejected
    #[serde(default)]
    error: Option<String>,
}

pub struct ZeroBounceClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ZeroBounceClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl EmailVerifier for ZeroBounceClient {
    async fn verify_email(
        &self,
        email: &str,
        _name: Option<&str>,
        _domain: Option<&str>,
    ) -> Result<EmailVerdict, ProviderError> {
        let url = format!("{}/v2/validate", self.base_url.trim_end_matches('/'));
        let params = [
            ("api_key", self.api_key.as_str()),
            ("email", email),
            ("ip_address", ""),
        ];

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let body: ValidateResponse = json(check_status(response).await?).await?;

        // Key problems come back as HTTP 200 with an `error` field.
        if let Some(error) = body.error {
            if error.to_lowercase().contains("api key") {
                return Err(ProviderError::Auth(error));
            }
            if error.to_lowercase().contains("credits") {
                return Err(ProviderError::Api(402, error));
            }
            return Err(ProviderError::Api(200, error));
        }

        let status = body
            .status
            .ok_or_else(|| ProviderError::Parse("missing status".to_string()))?;

        let verdict = match status.as_str() {
            "valid" => EmailStatus::Valid,
            "catch-all" => EmailStatus::CatchAll,
            "unknown" => EmailStatus::Unknown,
            // spamtrap, abuse, do_not_mail and invalid are all undeliverable for outreach
            _ => EmailStatus::Invalid,
        };

        let mut details = status.clone();
        if let Some(sub) = body.sub_status.filter(|s| !s.is_empty()) {
            details = format!("{}/{}", details, sub);
        }
        if body.free_email == Some(true) {
            details.push_str(" (free)");
        }

        tracing::debug!(email, status = %status, "ZeroBounce verdict");

        Ok(EmailVerdict {
            status: verdict,
            confidence: if verdict == EmailStatus::Valid { VALID_CONFIDENCE } else { 0 },
            details: Some(details),
        })
    }
}
