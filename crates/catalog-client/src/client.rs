//! The catalog client: lazy paginated search with bounded retries.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::Stream;
use futures::TryStreamExt;
use tracing::{instrument, warn};

use raster_common::AssetDescriptor;

use crate::error::QueryError;
use crate::request::SearchRequest;
use crate::transport::{CatalogTransport, HttpTransport, SearchPage, TransportError};

/// A lazy stream of asset descriptors.
///
/// Pages are fetched on demand; dropping the stream stops pagination.
pub type AssetStream = Pin<Box<dyn Stream<Item = Result<AssetDescriptor, QueryError>> + Send>>;

/// Retry behavior for transient transport failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry).
    pub initial_delay: Duration,
    /// Maximum retry delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Client for a remote asset catalog.
pub struct CatalogClient {
    transport: Arc<dyn CatalogTransport>,
    retry: RetryPolicy,
}

impl CatalogClient {
    /// Connect to a catalog over HTTP with default settings.
    pub fn connect(base_url: &str) -> Result<Self, QueryError> {
        let transport = HttpTransport::new(base_url, Duration::from_secs(30))
            .map_err(|e| QueryError::Unreachable {
                attempts: 0,
                message: e.to_string(),
            })?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Create a client over an explicit transport (used by tests and by
    /// services that manage their own HTTP stack).
    pub fn with_transport(transport: Arc<dyn CatalogTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run a search, returning a lazy paginated stream of descriptors.
    ///
    /// The request is validated before any page is fetched. Each yielded
    /// descriptor intersects the requested region and lies within the
    /// requested time interval; anything else the catalog returns is
    /// dropped with a warning.
    #[instrument(skip(self, request), fields(collections = ?request.collections))]
    pub fn search(&self, request: SearchRequest) -> Result<AssetStream, QueryError> {
        request.validate()?;

        struct PageState {
            transport: Arc<dyn CatalogTransport>,
            retry: RetryPolicy,
            request: SearchRequest,
            token: Option<String>,
            buffered: VecDeque<AssetDescriptor>,
            exhausted: bool,
        }

        let state = PageState {
            transport: Arc::clone(&self.transport),
            retry: self.retry.clone(),
            request,
            token: None,
            buffered: VecDeque::new(),
            exhausted: false,
        };

        let stream = futures::stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(descriptor) = state.buffered.pop_front() {
                    return Ok(Some((descriptor, state)));
                }
                if state.exhausted {
                    return Ok(None);
                }

                let page = fetch_page_with_retry(
                    state.transport.as_ref(),
                    &state.retry,
                    &state.request,
                    state.token.as_deref(),
                )
                .await?;

                state.exhausted = page.next_token.is_none();
                state.token = page.next_token;
                state.buffered = filter_page(&state.request, page.items);
            }
        });

        Ok(Box::pin(stream))
    }

    /// Run a search and collect every matching descriptor.
    pub async fn search_collected(
        &self,
        request: SearchRequest,
    ) -> Result<Vec<AssetDescriptor>, QueryError> {
        self.search(request)?.try_collect().await
    }
}

/// Drop descriptors outside the requested bounds.
fn filter_page(
    request: &SearchRequest,
    items: Vec<AssetDescriptor>,
) -> VecDeque<AssetDescriptor> {
    items
        .into_iter()
        .filter(|descriptor| {
            let keep = request.contains(descriptor);
            if !keep {
                warn!(uri = %descriptor.uri, "Dropping out-of-bounds descriptor from catalog page");
            }
            keep
        })
        .collect()
}

/// Fetch one page, retrying transient failures with exponential backoff.
async fn fetch_page_with_retry(
    transport: &dyn CatalogTransport,
    retry: &RetryPolicy,
    request: &SearchRequest,
    token: Option<&str>,
) -> Result<SearchPage, QueryError> {
    let mut attempt = 0u32;
    let mut delay = retry.initial_delay;

    loop {
        attempt += 1;
        match transport.fetch_page(request, token).await {
            Ok(page) => return Ok(page),
            Err(TransportError::Transient(message)) => {
                if attempt > retry.max_retries {
                    return Err(QueryError::Unreachable { attempts: attempt, message });
                }

                warn!(
                    attempt,
                    max_retries = retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Catalog page fetch failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, retry.max_delay);
            }
            Err(TransportError::Auth(message)) => {
                return Err(QueryError::AuthFailed(message));
            }
            Err(TransportError::Rejected(message)) => {
                return Err(QueryError::Rejected(message));
            }
            Err(TransportError::Decode(message)) => {
                return Err(QueryError::MalformedResponse(message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert!(policy.initial_delay < policy.max_delay);
    }

    #[tokio::test]
    async fn test_search_rejects_invalid_request_without_io() {
        struct PanicTransport;

        #[async_trait::async_trait]
        impl CatalogTransport for PanicTransport {
            async fn fetch_page(
                &self,
                _request: &SearchRequest,
                _token: Option<&str>,
            ) -> Result<SearchPage, TransportError> {
                panic!("transport must not be called for an invalid request");
            }
        }

        let client = CatalogClient::with_transport(Arc::new(PanicTransport));
        let request = SearchRequest::collections(Vec::<String>::new());

        assert!(matches!(
            client.search(request),
            Err(QueryError::InvalidRequest(_))
        ));
    }
}
