//! Twilio Lookup v2 client (phone validation and line type)

use super::http::{build_client, check_status, json, transport_error};
use super::{PhoneVerdict, PhoneVerifier, ProviderError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://lookups.twilio.com";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    valid: Option<bool>,
    #[serde(default)]
    line_type_intelligence: Option<LineTypeIntelligence>,
}

#[derive(Debug, Deserialize)]
struct LineTypeIntelligence {
    #[serde(rename = "type", default)]
    line_type: Option<String>,
}

pub struct TwilioClient {
    http_client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    timeout: Duration,
}

impl TwilioClient {
    /// `credentials` is `ACCOUNT_SID:AUTH_TOKEN`
    pub fn new(credentials: &str, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let (sid, token) = credentials
            .split_once(':')
            .filter(|(s, t)| !s.is_empty() && !t.is_empty())
            .ok_or_else(|| ProviderError::Auth("Twilio key must be ACCOUNT_SID:AUTH_TOKEN".to_string()))?;

        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            account_sid: sid.to_string(),
            auth_token: token.to_string(),
            timeout,
        })
    }
}

/// Confidence by line type for a valid number
fn line_type_confidence(line_type: Option<&str>) -> u8 {
    match line_type {
        Some("mobile") => 95,
        Some("landline") => 90,
        Some("fixedVoip") | Some("tollFree") => 75,
        Some("nonFixedVoip") => 65,
        Some(_) => 70,
        None => 80,
    }
}

#[async_trait]
impl PhoneVerifier for TwilioClient {
    async fn verify_phone(
        &self,
        phone: &str,
        _name: Option<&str>,
        _company: Option<&str>,
    ) -> Result<Option<PhoneVerdict>, ProviderError> {
        let url = format!(
            "{}/v2/PhoneNumbers/{}",
            self.base_url.trim_end_matches('/'),
            phone
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .query(&[("Fields", "line_type_intelligence")])
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: LookupResponse = json(check_status(response).await?).await?;

        let Some(valid) = body.valid else {
            return Ok(None);
        };
        let line_type = body.line_type_intelligence.and_then(|l| l.line_type);

        Ok(Some(PhoneVerdict {
            valid,
            confidence: if valid { line_type_confidence(line_type.as_deref()) } else { 0 },
            line_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_credentials() {
        let err = TwilioClient::new("only-a-sid", None, Duration::from_secs(5)).err();
        assert!(matches!(err, Some(ProviderError::Auth(_))));
        assert!(TwilioClient::new("AC123:secret", None, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_line_type_confidence() {
        assert_eq!(line_type_confidence(Some("mobile")), 95);
        assert!(line_type_confidence(Some("nonFixedVoip")) < 90);
    }
}
