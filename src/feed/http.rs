//! HTTP feed client.
//!
//! `GET {base_url}/feeds/{kind}[?cursor=<page>]` with the `x-apikey` header, answering
//!
//! ```json
//! {"data": [{"id": "...", "attributes": {}, "context_attributes": {}}],
//!  "meta": {"cursor": "<this page>", "next": "<next page or null>"}}
//! ```

use std::time::Duration;

use serde::Deserialize;

use super::{FeedClient, FeedEntry, FeedPage};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::types::FeedKind;

/// Header carrying the API key on every request
pub(crate) const API_KEY_HEADER: &str = "x-apikey";

/// Build the HTTP client shared by feed and content requests
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("feed-dl/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    data: Vec<FeedEntry>,
    #[serde(default)]
    meta: FeedMeta,
}

#[derive(Debug, Default, Deserialize)]
struct FeedMeta {
    cursor: Option<String>,
    next: Option<String>,
}

/// Production [`FeedClient`] talking JSON over HTTP
pub struct HttpFeedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFeedClient {
    /// Create a client from the pipeline configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config.feed.request_timeout)?,
            base_url: config.feed.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn page_url(&self, kind: FeedKind) -> String {
        format!("{}/feeds/{}", self.base_url, kind)
    }
}

#[async_trait::async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_page(
        &self,
        kind: FeedKind,
        page: Option<&str>,
    ) -> std::result::Result<FeedPage, FeedError> {
        let url = self.page_url(kind);
        let mut request = self.http.get(&url).header(API_KEY_HEADER, &self.api_key);
        if let Some(page) = page {
            request = request.query(&[("cursor", page)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        let parsed: FeedResponse =
            serde_json::from_str(&body).map_err(|e| FeedError::InvalidResponse(e.to_string()))?;

        let cursor = parsed
            .meta
            .cursor
            .or_else(|| page.map(str::to_string))
            .ok_or_else(|| FeedError::InvalidResponse("page carries no cursor".to_string()))?;

        Ok(FeedPage {
            cursor,
            entries: parsed.data,
            next: parsed.meta.next,
        })
    }
}
