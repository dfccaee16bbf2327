//! Prospeo client: email finder and mobile finder

use super::http::{build_client, status_error, transport_error};
use super::{Discovered, EmailDiscoverer, PhoneDiscoverer, ProviderError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.prospeo.io";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct EmailFinderResponse {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MobileFinderResponse {
    #[serde(default)]
    raw_format: Option<String>,
    #[serde(default)]
    international_format: Option<String>,
}

pub struct ProspeoClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl ProspeoClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            timeout,
        })
    }

    /// POST to an endpoint; a `NO_MATCH` answer becomes `Ok(None)`
    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<T>, ProviderError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .http_client
            .post(&url)
            .header("X-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let envelope: Option<Envelope<T>> = serde_json::from_str(&text).ok();

        let message = envelope
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();
        if message == "NO_MATCH" || message == "NO_RESULT" {
            return Ok(None);
        }
        if message == "INVALID_API_KEY" {
            return Err(ProviderError::Auth(message));
        }
        if !status.is_success() {
            return Err(status_error(status, text));
        }

        match envelope {
            Some(envelope) if !envelope.error => Ok(envelope.response),
            Some(_) => Err(ProviderError::Api(StatusCode::OK.as_u16(), message)),
            None => Err(ProviderError::Parse(format!("unexpected body from {}", path))),
        }
    }
}

#[async_trait]
impl EmailDiscoverer for ProspeoClient {
    async fn discover_email(&self, name: &str, domain: &str) -> Result<Option<Discovered>, ProviderError> {
        let found: Option<EmailFinderResponse> = self
            .post("email-finder", json!({ "full_name": name, "company": domain }))
            .await?;

        Ok(found.and_then(|r| {
            let confidence = match r.email_status.as_deref() {
                Some("VALID") => Some(85),
                Some("CATCH_ALL") | Some("ACCEPT_ALL") => Some(60),
                _ => None,
            };
            r.email.filter(|e| !e.is_empty()).map(|value| Discovered { value, confidence })
        }))
    }
}

#[async_trait]
impl PhoneDiscoverer for ProspeoClient {
    /// The mobile finder only works from a LinkedIn profile
    fn can_discover(&self, _name: Option<&str>, _company: Option<&str>, linkedin_url: Option<&str>) -> bool {
        linkedin_url.is_some()
    }

    async fn discover_phone(
        &self,
        _name: Option<&str>,
        _company: Option<&str>,
        linkedin_url: Option<&str>,
    ) -> Result<Option<Discovered>, ProviderError> {
        let Some(url) = linkedin_url else {
            return Ok(None);
        };

        let found: Option<MobileFinderResponse> = self.post("mobile-finder", json!({ "url": url })).await?;

        Ok(found
            .and_then(|r| r.international_format.or(r.raw_format))
            .filter(|p| !p.is_empty())
            .map(|value| Discovered {
                value,
                confidence: Some(70),
            }))
    }
}
