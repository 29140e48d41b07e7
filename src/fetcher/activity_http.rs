//! HTTP transport for the organization-scoped activity endpoint
//!
//! Sends exactly one GET per call and reports whatever came back. Retrying,
//! status interpretation and body parsing belong to the paginator.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{ActivityApi, BearerToken, PageQuery, PageResponse, RetryErrorType, TransportError};
use crate::identity::OrganizationId;

/// Default base URL of the reporting API
pub const DEFAULT_REPORTS_BASE_URL: &str = "https://reports.api.umbrella.com/v2";

/// Per-request socket timeout
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// HTTP connect timeout
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// reqwest-backed [`ActivityApi`]
pub struct UmbrellaHttpClient {
    client: Client,
    endpoint: String,
}

impl UmbrellaHttpClient {
    /// Client for `org_id` against the default reporting API
    pub fn new(org_id: OrganizationId) -> Result<Self, TransportError> {
        Self::with_base_url(org_id, DEFAULT_REPORTS_BASE_URL)
    }

    /// Client for `org_id` against a custom base URL (e.g. a mock server)
    pub fn with_base_url(
        org_id: OrganizationId,
        base_url: impl AsRef<str>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::new(RetryErrorType::RequestInvalid, e.to_string()))?;

        Ok(Self::with_client(client, org_id, base_url))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client, org_id: OrganizationId, base_url: impl AsRef<str>) -> Self {
        let endpoint = format!(
            "{}/organizations/{}/activity",
            base_url.as_ref().trim_end_matches('/'),
            org_id
        );
        Self { client, endpoint }
    }
}

#[async_trait]
impl ActivityApi for UmbrellaHttpClient {
    async fn fetch_page(
        &self,
        query: &PageQuery,
        token: &BearerToken,
    ) -> Result<PageResponse, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            from = query.window.start_ms(),
            to = query.window.end_ms(),
            limit = query.limit,
            offset = query.offset,
            "GET activity page"
        );

        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header())
            .query(&query.params())
            .send()
            .await
            .map_err(|e| TransportError::new(RetryErrorType::from_reqwest(&e), e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::new(RetryErrorType::TruncatedBody, e.to_string()))?;

        Ok(PageResponse { status, body })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
