//! People Data Labs person enrichment client
//!
//! Serves two capabilities from the same endpoint: phone discovery and
//! career-history lookup for churn prediction.

use super::http::{build_client, check_status, json, transport_error};
use super::{Discovered, PhoneDiscoverer, ProfileFetcher, ProviderError};
use crate::types::RoleSpan;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.peopledatalabs.com";

#[derive(Debug, Deserialize)]
struct EnrichResponse {
    #[serde(default)]
    likelihood: Option<u8>,
    #[serde(default)]
    data: Option<PersonData>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonData {
    #[serde(default)]
    mobile_phone: Option<String>,
    #[serde(default)]
    phone_numbers: Vec<String>,
    #[serde(default)]
    experience: Vec<Experience>,
}

#[derive(Debug, Deserialize)]
struct Experience {
    #[serde(default)]
    company: Option<Named>,
    #[serde(default)]
    title: Option<Named>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

pub struct PdlClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl PdlClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            timeout,
        })
    }

    async fn enrich(&self, params: &[(&str, &str)]) -> Result<Option<EnrichResponse>, ProviderError> {
        let url = format!("{}/v5/person/enrich", self.base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        // 404 means no person matched
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: EnrichResponse = json(check_status(response).await?).await?;
        Ok(Some(body))
    }
}

#[async_trait]
impl PhoneDiscoverer for PdlClient {
    async fn discover_phone(
        &self,
        name: Option<&str>,
        company: Option<&str>,
        linkedin_url: Option<&str>,
    ) -> Result<Option<Discovered>, ProviderError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(profile) = linkedin_url {
            params.push(("profile", profile));
        }
        if let Some(name) = name {
            params.push(("name", name));
        }
        if let Some(company) = company {
            params.push(("company", company));
        }

        let Some(body) = self.enrich(&params).await? else {
            return Ok(None);
        };
        let data = body.data.unwrap_or_default();

        let phone = data
            .mobile_phone
            .or_else(|| data.phone_numbers.into_iter().next())
            .filter(|p| !p.is_empty());

        Ok(phone.map(|value| Discovered {
            value,
            // Likelihood is 1-10
            confidence: body.likelihood.map(|l| (l.min(10) * 10).min(85)),
        }))
    }
}

#[async_trait]
impl ProfileFetcher for PdlClient {
    async fn fetch_profile(&self, linkedin_url: &str) -> Result<Option<Vec<RoleSpan>>, ProviderError> {
        let Some(body) = self.enrich(&[("profile", linkedin_url)]).await? else {
            return Ok(None);
        };
        let Some(data) = body.data else {
            return Ok(None);
        };

        let history: Vec<RoleSpan> = data
            .experience
            .into_iter()
            .map(|e| RoleSpan {
                title: e.title.and_then(|t| t.name),
                company: e.company.and_then(|c| c.name),
                start_date: e.start_date,
                end_date: e.end_date,
            })
            .collect();

        Ok((!history.is_empty()).then_some(history))
    }
}
