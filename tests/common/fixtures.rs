//! In-memory feed and content collaborators

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feed_dl::{
    Attributes, Config, ContentFetchError, ContentFetcher, FeedClient, FeedEntry, FeedError,
    FeedKind, FeedPage, ShutdownController,
};
use serde_json::json;

/// Feed served from memory, pages chained through `next`
#[derive(Default)]
pub struct MemoryFeed {
    first: String,
    pages: Mutex<HashMap<String, FeedPage>>,
    requests: Mutex<Vec<String>>,
    failing_page: Option<String>,
    abort_on: Mutex<Option<(String, ShutdownController)>>,
}

impl MemoryFeed {
    /// Build from `(page, ids, next)` triples; the first triple is the start of the feed
    pub fn new(pages: &[(&str, &[&str], Option<&str>)]) -> Self {
        let map = pages
            .iter()
            .map(|(token, ids, next)| {
                (
                    token.to_string(),
                    FeedPage {
                        cursor: token.to_string(),
                        entries: ids.iter().map(|id| file_entry(id)).collect(),
                        next: next.map(str::to_string),
                    },
                )
            })
            .collect();
        Self {
            first: pages[0].0.to_string(),
            pages: Mutex::new(map),
            ..Self::default()
        }
    }

    /// Answer requests for `page` with an HTTP 500
    pub fn failing_on(mut self, page: &str) -> Self {
        self.failing_page = Some(page.to_string());
        self
    }

    /// Request an abort while serving `page`, as if interrupted mid-request
    pub fn abort_while_serving(&self, page: &str, shutdown: ShutdownController) {
        *self.abort_on.lock().unwrap() = Some((page.to_string(), shutdown));
    }

    /// Publish a new page after `from`
    pub fn link_page(&self, from: &str, token: &str, ids: &[&str]) {
        let mut pages = self.pages.lock().unwrap();
        pages.get_mut(from).unwrap().next = Some(token.to_string());
        pages.insert(
            token.to_string(),
            FeedPage {
                cursor: token.to_string(),
                entries: ids.iter().map(|id| file_entry(id)).collect(),
                next: None,
            },
        );
    }

    /// Pages requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FeedClient for MemoryFeed {
    async fn fetch_page(
        &self,
        _kind: FeedKind,
        page: Option<&str>,
    ) -> Result<FeedPage, FeedError> {
        let token = page.unwrap_or(&self.first).to_string();
        self.requests.lock().unwrap().push(token.clone());

        if let Some((abort_page, shutdown)) = self.abort_on.lock().unwrap().as_ref() {
            if *abort_page == token {
                shutdown.request_abort();
            }
        }
        if self.failing_page.as_deref() == Some(token.as_str()) {
            return Err(FeedError::Status {
                status: 500,
                url: format!("memory://{token}"),
            });
        }

        self.pages
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| FeedError::InvalidResponse(format!("unknown page {token}")))
    }
}

/// A file-feed style entry whose content lives at `mem://<id>`
pub fn file_entry(id: &str) -> FeedEntry {
    let mut attributes = Attributes::new();
    attributes.insert("sha256".to_string(), json!(id));
    attributes.insert("size".to_string(), json!(id.len() * 10));
    attributes.insert("tags".to_string(), json!(["peexe", "signed"]));
    attributes.insert(
        "last_analysis_stats".to_string(),
        json!({"malicious": 2, "undetected": 60}),
    );
    let mut context = Attributes::new();
    context.insert("download_url".to_string(), json!(format!("mem://{id}")));
    FeedEntry {
        id: id.to_string(),
        attributes,
        context,
    }
}

/// Bytes that [`MemoryContent`] serves for `id`
pub fn content_for(id: &str) -> Vec<u8> {
    format!("payload of {id}").into_bytes()
}

/// Serves `mem://<id>` references; can fail or panic on chosen ids and slow every download
#[derive(Default)]
pub struct MemoryContent {
    failing: Vec<String>,
    panicking: Vec<String>,
    delay: Option<Duration>,
    fetched: AtomicUsize,
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Panic while downloading these ids, as a buggy fetcher would
    pub fn panicking(mut self, ids: &[&str]) -> Self {
        self.panicking = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentFetcher for MemoryContent {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ContentFetchError> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let id = reference.trim_start_matches("mem://");
        if self.panicking.iter().any(|p| p == id) {
            panic!("content fetch for {id} panicked");
        }
        if self.failing.iter().any(|f| f == id) {
            return Err(ContentFetchError::Status {
                status: 404,
                reference: reference.to_string(),
            });
        }
        Ok(content_for(id))
    }
}

/// Config for in-memory runs writing under `dir`
pub fn test_config(dir: &Path, num_workers: usize, capacity: usize) -> Config {
    let mut config = Config {
        api_key: "test-key".to_string(),
        output_dir: dir.join("out"),
        num_workers,
        queue_capacity: Some(capacity),
        ..Config::default()
    };
    config.feed.follow = false;
    config
}

/// Upcast the fakes for [`feed_dl::PipelineRunner::new`]
pub fn collaborators(
    feed: &Arc<MemoryFeed>,
    content: &Arc<MemoryContent>,
) -> (Arc<dyn FeedClient>, Arc<dyn ContentFetcher>) {
    (feed.clone(), content.clone())
}
