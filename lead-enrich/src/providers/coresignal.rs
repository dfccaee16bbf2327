//! CoreSignal multi-source API client
//!
//! Company search is billed in search credits, employee lookups in collect
//! credits. Both use the Elasticsearch DSL preview endpoints, which return
//! records directly instead of ids.

use super::http::{build_client, check_status, json, transport_error};
use super::{CompanySearch, EmployeeSource, ProviderError};
use crate::buyer_group::criteria::{EmployeeFilter, SearchQuery};
use crate::types::{CompanyRecord, Department, EmployeeRecord, Firmographics};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.coresignal.com/cdapi/v2";

#[derive(Debug, Deserialize)]
struct CompanyHit {
    id: Value,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    employees_count: Option<u32>,
    #[serde(default)]
    employees_count_change: Option<HeadcountChange>,
    #[serde(default)]
    active_job_postings_count: Option<u32>,
    #[serde(default)]
    hq_country: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadcountChange {
    #[serde(default)]
    change_yearly_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EmployeeHit {
    id: Value,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    active_experience_title: Option<String>,
    #[serde(default)]
    active_experience_department: Option<String>,
    #[serde(default)]
    connections_count: Option<u32>,
    #[serde(default)]
    linkedin_url: Option<String>,
}

pub struct CoreSignalClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl CoreSignalClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            timeout,
        })
    }

    async fn preview<T: serde::de::DeserializeOwned>(&self, path: &str, body: Value) -> Result<Vec<T>, ProviderError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        json(check_status(response).await?).await
    }
}

/// Company search body from a query
pub fn company_query(query: &SearchQuery) -> Value {
    let mut must = Vec::new();

    if !query.industries.is_empty() {
        let should: Vec<Value> = query
            .industries
            .iter()
            .map(|i| json!({ "match": { "industry": i } }))
            .collect();
        must.push(json!({ "bool": { "should": should, "minimum_should_match": 1 } }));
    }

    if query.min_employees.is_some() || query.max_employees.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(min) = query.min_employees {
            range.insert("gte".into(), json!(min));
        }
        if let Some(max) = query.max_employees {
            range.insert("lte".into(), json!(max));
        }
        must.push(json!({ "range": { "employees_count": range } }));
    }

    if !query.countries.is_empty() {
        must.push(json!({ "terms": { "hq_country": query.countries } }));
    }

    json!({ "query": { "bool": { "must": must } } })
}

/// Employee search body for one company
pub fn employee_query(company_id: &str, filter: &EmployeeFilter) -> Value {
    let should: Vec<Value> = filter
        .departments
        .iter()
        .map(|d| json!({ "match": { "active_experience_department": department_label(*d) } }))
        .collect();
    let must_not: Vec<Value> = filter
        .excluded_departments
        .iter()
        .map(|d| json!({ "match": { "active_experience_department": department_label(*d) } }))
        .collect();

    let mut bool_query = json!({
        "must": [ { "term": { "active_experience_company_id": company_id } } ],
        "must_not": must_not,
    });
    if !should.is_empty() {
        bool_query["should"] = Value::Array(should);
        bool_query["minimum_should_match"] = json!(1);
    }

    json!({ "query": { "bool": bool_query } })
}

fn department_label(department: Department) -> &'static str {
    match department {
        Department::Executive => "C-Suite",
        Department::Sales => "Sales",
        Department::Marketing => "Marketing",
        Department::Product => "Product",
        Department::Engineering => "Engineering and Technical",
        Department::Operations => "Operations",
        Department::Finance => "Finance & Accounting",
        Department::Hr => "Human Resources",
        Department::Legal => "Legal",
        Department::CustomerSuccess => "Customer Service",
        Department::Other => "Other",
    }
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CompanySearch for CoreSignalClient {
    async fn search_companies(&self, query: &SearchQuery) -> Result<Vec<CompanyRecord>, ProviderError> {
        let hits: Vec<CompanyHit> = self
            .preview("company_multi_source/search/es_dsl/preview", company_query(query))
            .await?;

        tracing::debug!(hits = hits.len(), "CoreSignal company search returned");

        Ok(hits
            .into_iter()
            .take(query.limit)
            .map(|hit| CompanyRecord {
                company_id: id_string(&hit.id),
                firmographics: Firmographics {
                    name: hit.company_name.unwrap_or_default(),
                    domain: hit.website,
                    industry: hit.industry,
                    employee_count: hit.employees_count,
                    headcount_growth_pct: hit
                        .employees_count_change
                        .and_then(|c| c.change_yearly_percentage),
                    open_jobs: hit.active_job_postings_count,
                    country: hit.hq_country,
                    description: hit.description,
                },
            })
            .collect())
    }
}

#[async_trait]
impl EmployeeSource for CoreSignalClient {
    async fn fetch_employees(
        &self,
        company_id: &str,
        filter: &EmployeeFilter,
    ) -> Result<Vec<EmployeeRecord>, ProviderError> {
        let hits: Vec<EmployeeHit> = self
            .preview(
                "employee_multi_source/search/es_dsl/preview",
                employee_query(company_id, filter),
            )
            .await?;

        Ok(hits
            .into_iter()
            .take(filter.limit)
            .map(|hit| EmployeeRecord {
                person_id: id_string(&hit.id),
                company_id: company_id.to_string(),
                full_name: hit.full_name.unwrap_or_default(),
                title: hit.active_experience_title,
                department: hit.active_experience_department,
                connections: hit.connections_count,
                linkedin_url: hit.linkedin_url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_query_shape() {
        let query = SearchQuery {
            industries: vec!["Software".into(), "Fintech".into()],
            min_employees: Some(200),
            max_employees: Some(1000),
            countries: vec!["United States".into()],
            limit: 10,
        };

        let body = company_query(&query);
        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 3);
        assert_eq!(must[1]["range"]["employees_count"]["gte"], 200);
        assert_eq!(must[1]["range"]["employees_count"]["lte"], 1000);
    }

    #[test]
    fn test_open_ended_size_band() {
        let query = SearchQuery {
            industries: vec![],
            min_employees: Some(1000),
            max_employees: None,
            countries: vec![],
            limit: 10,
        };
        let body = company_query(&query);
        let range = &body["query"]["bool"]["must"][0]["range"]["employees_count"];
        assert_eq!(range["gte"], 1000);
        assert!(range.get("lte").is_none());
    }

    #[test]
    fn test_employee_query_excludes_departments() {
        let filter = EmployeeFilter {
            departments: vec![Department::Sales],
            excluded_departments: vec![Department::Hr],
            limit: 50,
        };
        let body = employee_query("42", &filter);
        let bool_query = &body["query"]["bool"];
        assert_eq!(bool_query["must"][0]["term"]["active_experience_company_id"], "42");
        assert_eq!(
            bool_query["must_not"][0]["match"]["active_experience_department"],
            "Human Resources"
        );
        assert_eq!(bool_query["should"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        assert_eq!(id_string(&json!(123)), "123");
        assert_eq!(id_string(&json!("abc")), "abc");
    }
}
