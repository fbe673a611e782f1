//! Catalog transport: one page fetch at a time.
//!
//! The transport trait isolates the HTTP details so the client's
//! pagination and retry logic can be exercised against an in-memory
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use raster_common::AssetDescriptor;

use crate::request::SearchRequest;

/// One page of search results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPage {
    /// Descriptors on this page.
    pub items: Vec<AssetDescriptor>,

    /// Opaque continuation token; `None` when the catalog is exhausted.
    pub next_token: Option<String>,
}

/// Transport-level failure, classified for retry handling.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Worth retrying: timeouts, connection resets, server-side errors.
    #[error("transient transport failure: {0}")]
    Transient(String),

    /// Credentials rejected; retrying will not help.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The catalog rejected the request outright.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The response could not be decoded.
    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Fetches one page of catalog results.
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn fetch_page(
        &self,
        request: &SearchRequest,
        page_token: Option<&str>,
    ) -> Result<SearchPage, TransportError>;
}

/// JSON body POSTed to the catalog's search endpoint.
#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    collections: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a crate::request::SpatialFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datetime: Option<String>,
    filters: &'a [crate::request::AttributeFilter],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

/// HTTP transport speaking the catalog's JSON search protocol.
pub struct HttpTransport {
    client: reqwest::Client,
    search_url: String,
}

impl HttpTransport {
    /// Create a transport for the given catalog base URL.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Transient(format!("failed to create client: {}", e)))?;

        Ok(Self {
            client,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
        })
    }

    fn datetime_field(request: &SearchRequest) -> Option<String> {
        if request.time.start.is_none() && request.time.end.is_none() {
            return None;
        }
        let fmt = |bound: Option<chrono::DateTime<chrono::Utc>>| {
            bound
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .unwrap_or_else(|| "..".to_string())
        };
        Some(format!(
            "{}/{}",
            fmt(request.time.start),
            fmt(request.time.end)
        ))
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn fetch_page(
        &self,
        request: &SearchRequest,
        page_token: Option<&str>,
    ) -> Result<SearchPage, TransportError> {
        let body = SearchBody {
            collections: &request.collections,
            region: request.region.as_ref(),
            datetime: Self::datetime_field(request),
            filters: &request.filters,
            limit: request.page_size,
            token: page_token,
        };

        let response = self
            .client
            .post(&self.search_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TransportError::Transient(e.to_string())
                } else {
                    TransportError::Rejected(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TransportError::Auth(format!("status {}", status)));
        }
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(TransportError::Transient(format!("status {}", status)));
        }
        if !status.is_success() {
            return Err(TransportError::Rejected(format!("status {}", status)));
        }

        let page: SearchPage = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        debug!(
            items = page.items.len(),
            has_next = page.next_token.is_some(),
            "Fetched catalog page"
        );

        Ok(page)
    }
}
