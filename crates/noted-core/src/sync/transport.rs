//! Wire-level pull/push against the reconciliation endpoint

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sync::protocol::{SyncRequest, SyncResponse};

/// Default bound on a stalled pull or push
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The two wire operations the sync engine needs
///
/// A trait seam so tests (and in-process setups) can reconcile without
/// a network.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch everything changed since the watermark; `None` asks for a
    /// full snapshot (first sync or re-install)
    async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<SyncResponse>;

    /// Submit a batch of local changes and receive the authoritative
    /// post-state
    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse>;
}

/// HTTP implementation speaking to `GET/POST {endpoint}/sync`
pub struct HttpSyncTransport {
    endpoint: String,
    access_token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncTransport")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSyncTransport {
    /// Create a transport with the default timeout
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, access_token, DEFAULT_TIMEOUT)
    }

    /// Create a transport with an explicit request timeout; exceeding
    /// it fails the request like any other network error
    pub fn with_timeout(
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Access token must not be empty".to_string(),
            ));
        }
        Ok(Self {
            endpoint,
            access_token,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    fn sync_url(&self) -> String {
        format!("{}/sync", self.endpoint)
    }

    async fn read_response(response: reqwest::Response) -> Result<SyncResponse> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unauthorized(parse_api_error(status, &body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<SyncResponse>().await?)
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<SyncResponse> {
        let mut request = self
            .client
            .get(self.sync_url())
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json");
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        Self::read_response(request.send().await?).await
    }

    async fn push(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let response = self
            .client
            .post(self.sync_url())
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;
        Self::read_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(Error::InvalidInput(
            "Sync endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "Sync endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(HttpSyncTransport::new("https://api.example.com", "  ").is_err());
    }

    #[test]
    fn test_parse_api_error_prefers_structured_body() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid 'since' timestamp format"}"#,
        );
        assert_eq!(message, "invalid 'since' timestamp format (400)");

        let fallback = parse_api_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(fallback, "HTTP 502");
    }

    #[test]
    fn test_debug_redacts_token() {
        let transport = HttpSyncTransport::new("https://api.example.com", "secret").unwrap();
        let debug = format!("{transport:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
