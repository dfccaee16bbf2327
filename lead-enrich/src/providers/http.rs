//! Shared HTTP plumbing for the vendor adapters

use super::ProviderError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a client with the engine user agent
///
/// The guard enforces the per-call timeout; the client timeout is a backstop a
/// little above it.
pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(lead_common::config::get_user_agent())
        .timeout(timeout + Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// Map a transport error
pub fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Classify a non-success status
///
/// 401/403 disable the provider, 429 is retried, everything else is an API error.
pub async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

pub fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Auth(format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        _ => ProviderError::Api(status.as_u16(), truncate(&body, 500)),
    }
}

/// Decode a JSON body
pub async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Split a full name into first and last name
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.last().unwrap_or_default().to_string();
    (first, last)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key".into()),
            ProviderError::Auth(_)
        ));
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "upstream".into()),
            ProviderError::Api(502, "upstream".into())
        );
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Dana  Reyes"), ("Dana".into(), "Reyes".into()));
        assert_eq!(split_name("Ana María López"), ("Ana".into(), "López".into()));
        assert_eq!(split_name("Cher"), ("Cher".into(), String::new()));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate(&text, 5);
        assert!(cut.ends_with("..."));
    }
}
