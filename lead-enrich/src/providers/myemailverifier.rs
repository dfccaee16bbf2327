//! MyEmailVerifier client (secondary SMTP verifier)

use super::http::{build_client, check_status, json, transport_error};
use super::{EmailStatus, EmailVerdict, EmailVerifier, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://client.myemailverifier.com";

const VALID_CONFIDENCE: u8 = 92;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    diagnosis: Option<String>,
    #[serde(default, rename = "catch_all")]
    catch_all: Option<String>,
    #[serde(default, rename = "Disposable_Domain")]
    disposable_domain: Option<String>,
}

pub struct MyEmailVerifierClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl MyEmailVerifierClient {
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
impl EmailVerifier for MyEmailVerifierClient {
    async fn verify_email(
        &self,
        email: &str,
        _name: Option<&str>,
        _domain: Option<&str>,
    ) -> Result<EmailVerdict, ProviderError> {
        let url = format!(
            "{}/verifier/validate_single/{}/{}",
            self.base_url.trim_end_matches('/'),
            email,
            self.api_key
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let body: ValidateResponse = json(check_status(response).await?).await?;

        let status = body
            .status
            .ok_or_else(|| ProviderError::Parse("missing Status".to_string()))?;

        if status.eq_ignore_ascii_case("invalid api key") {
            return Err(ProviderError::Auth(status));
        }

        let catch_all = body
            .catch_all
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let disposable = body
            .disposable_domain
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let verdict = match status.to_lowercase().as_str() {
            _ if disposable => EmailStatus::Invalid,
            "valid" if catch_all => EmailStatus::CatchAll,
            "valid" => EmailStatus::Valid,
            "catch all" | "catch-all" => EmailStatus::CatchAll,
            "unknown" | "grey-listed" => EmailStatus::Unknown,
            _ => EmailStatus::Invalid,
        };

        Ok(EmailVerdict {
            status: verdict,
            confidence: if verdict == EmailStatus::Valid { VALID_CONFIDENCE } else { 0 },
            details: body.diagnosis.or(Some(status)),
        })
    }
}
