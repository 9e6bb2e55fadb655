//! Content download for queued items.

use crate::config::{Config, RetryConfig};
use crate::error::{ContentFetchError, Result};
use crate::feed::http::{API_KEY_HEADER, build_http_client};
use crate::retry::download_with_retry;

/// Abstraction over payload downloads, enabling testability
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Download the bytes behind a content reference
    async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ContentFetchError>;
}

/// Production [`ContentFetcher`]: authenticated GET with exponential backoff
pub struct HttpContentFetcher {
    http: reqwest::Client,
    api_key: String,
    retry: RetryConfig,
}

impl HttpContentFetcher {
    /// Create a fetcher from the pipeline configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config.feed.request_timeout)?,
            api_key: config.api_key.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn fetch_once(&self, reference: &str) -> std::result::Result<Vec<u8>, ContentFetchError> {
        let response = self
            .http
            .get(reference)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentFetchError::Status {
                status: status.as_u16(),
                reference: reference.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ContentFetchError> {
        download_with_retry(&self.retry, || self.fetch_once(reference)).await
    }
}
