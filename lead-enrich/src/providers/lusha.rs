//! Lusha person API client (phone discovery)

use super::http::{build_client, check_status, json, split_name, transport_error};
use super::{Discovered, PhoneDiscoverer, ProviderError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.lusha.com";

#[derive(Debug, Deserialize)]
struct PersonResponse {
    #[serde(default)]
    contact: Option<Contact>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    data: Option<ContactData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactData {
    #[serde(default)]
    phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneNumber {
    #[serde(default)]
    international_number: Option<String>,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    phone_type: Option<String>,
    #[serde(default)]
    do_not_call: bool,
}

pub struct LushaClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl LushaClient {
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
impl PhoneDiscoverer for LushaClient {
    async fn discover_phone(
        &self,
        name: Option<&str>,
        company: Option<&str>,
        linkedin_url: Option<&str>,
    ) -> Result<Option<Discovered>, ProviderError> {
        let url = format!("{}/v2/person", self.base_url.trim_end_matches('/'));

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(name) = name {
            let (first, last) = split_name(name);
            params.push(("firstName", first));
            params.push(("lastName", last));
        }
        if let Some(company) = company {
            params.push(("companyName", company.to_string()));
        }
        if let Some(linkedin) = linkedin_url {
            params.push(("linkedinUrl", linkedin.to_string()));
        }

        let response = self
            .http_client
            .get(&url)
            .header("api_key", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: PersonResponse = json(check_status(response).await?).await?;

        let numbers = body
            .contact
            .and_then(|c| c.data)
            .map(|d| d.phone_numbers)
            .unwrap_or_default();

        // Prefer a callable mobile number
        let best = numbers
            .iter()
            .filter(|p| !p.do_not_call)
            .max_by_key(|p| p.phone_type.as_deref() == Some("mobile"));

        Ok(best
            .and_then(|p| p.international_number.clone().or_else(|| p.number.clone()))
            .map(|value| Discovered {
                value,
                confidence: Some(75),
            }))
    }
}
