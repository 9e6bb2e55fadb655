//! Feed consumption, the producer side of the pipeline.
//!
//! - [`FeedClient`] is the seam to the remote feed (one page per call)
//! - [`FeedSource`] turns pages into a lazy, ordered stream of [`Item`]s and owns the
//!   feed position
//! - [`http`] provides the reqwest-backed client

pub mod http;


use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::shutdown::ShutdownController;
use crate::types::{Attributes, Cursor, FeedKind, Item};

pub use http::HttpFeedClient;

/// One entry of a feed page, before it is given a position
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FeedEntry {
    /// Item identifier
    pub id: String,
    /// Attribute mapping
    #[serde(default)]
    pub attributes: Attributes,
    /// Delivery context (download locators)
    #[serde(default, rename = "context_attributes")]
    pub context: Attributes,
}

/// A page of the feed as returned by a [`FeedClient`]
#[derive(Clone, Debug, PartialEq)]
pub struct FeedPage {
    /// Token identifying this page
    pub cursor: String,
    /// Entries in feed order
    pub entries: Vec<FeedEntry>,
    /// Token of the following page (None = this is the newest page)
    pub next: Option<String>,
}

/// Abstraction over the remote feed, enabling testability
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch one page; `page = None` asks for the start of the feed
    async fn fetch_page(&self, kind: FeedKind, page: Option<&str>)
    -> Result<FeedPage, FeedError>;
}

/// Lazy, ordered item stream over a [`FeedClient`] with resumable position tracking
///
/// The position only moves forward, and only when an item is handed out by
/// [`next_item`](Self::next_item). Fetch failures are returned as-is and never
/// retried here.
pub struct FeedSource {
    client: Arc<dyn FeedClient>,
    kind: FeedKind,
    shutdown: ShutdownController,
    follow: bool,
    poll_interval: Duration,
    /// Position after the last yielded item (or the resume point)
    position: Option<Cursor>,
    /// Page being read; None until the first page arrives on a fresh start
    page: Option<String>,
    /// Entries of `page` already yielded or skipped
    offset: u64,
    buffer: VecDeque<FeedEntry>,
    /// Whether `page` has been fetched since it became current
    loaded: bool,
    next: Option<String>,
    exhausted: bool,
}

impl FeedSource {
    /// Open the feed at `start` (None = beginning)
    pub fn open(
        client: Arc<dyn FeedClient>,
        kind: FeedKind,
        start: Option<Cursor>,
        shutdown: ShutdownController,
    ) -> Self {
        let (page, offset) = match &start {
            Some(cursor) => (Some(cursor.page().to_string()), cursor.offset()),
            None => (None, 0),
        };
        Self {
            client,
            kind,
            shutdown,
            follow: false,
            poll_interval: Duration::from_secs(60),
            position: start,
            page,
            offset,
            buffer: VecDeque::new(),
            loaded: false,
            next: None,
            exhausted: false,
        }
    }

    /// Open the feed described by a [`FeedConfig`]
    pub fn from_config(
        client: Arc<dyn FeedClient>,
        config: &FeedConfig,
        shutdown: ShutdownController,
    ) -> Self {
        Self::open(client, config.kind, config.cursor.clone(), shutdown)
            .follow(config.follow, config.poll_interval)
    }

    /// Keep polling the newest page every `poll_interval` instead of ending the feed
    #[must_use]
    pub fn follow(mut self, follow: bool, poll_interval: Duration) -> Self {
        self.follow = follow;
        self.poll_interval = poll_interval;
        self
    }

    /// Position as of the last yielded item
    pub fn current_position(&self) -> Option<&Cursor> {
        self.position.as_ref()
    }

    /// Consume the source, keeping only its final position
    pub fn into_position(self) -> Option<Cursor> {
        self.position
    }

    /// Pull the next item
    ///
    /// Returns `Ok(None)` when the feed is exhausted or an abort was observed before
    /// asking for the item. A request already in flight is always allowed to finish,
    /// and the first item it brings back is still yielded.
    pub async fn next_item(&mut self) -> Result<Option<Item>, FeedError> {
        loop {
            if self.shutdown.is_aborted() {
                return Ok(None);
            }

            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(self.yield_entry(entry)));
            }

            if self.exhausted {
                return Ok(None);
            }

            if self.loaded {
                match self.next.take() {
                    Some(next) => {
                        self.page = Some(next);
                        self.offset = 0;
                    }
                    None if self.follow => {
                        tracing::debug!(
                            page = self.page.as_deref().unwrap_or_default(),
                            "caught up with the feed, polling again later"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval) => {}
                            _ = self.shutdown.aborted() => return Ok(None),
                        }
                    }
                    None => {
                        tracing::info!("feed exhausted");
                        self.exhausted = true;
                        return Ok(None);
                    }
                }
                self.loaded = false;
            }

            self.load_page().await?;
            if let Some(entry) = self.buffer.pop_front() {
                return Ok(Some(self.yield_entry(entry)));
            }
        }
    }

    fn yield_entry(&mut self, entry: FeedEntry) -> Item {
        // `page` is always set once a page has been loaded
        let page = self.page.clone().unwrap_or_default();
        self.offset += 1;
        let position = Cursor::new(page, self.offset);
        self.position = Some(position.clone());
        Item {
            id: entry.id,
            attributes: entry.attributes,
            context: entry.context,
            position,
        }
    }

    async fn load_page(&mut self) -> Result<(), FeedError> {
        let page = self
            .client
            .fetch_page(self.kind, self.page.as_deref())
            .await?;

        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let total = page.entries.len();
        self.buffer = page.entries.into_iter().skip(skip).collect();
        tracing::debug!(
            page = %page.cursor,
            entries = total,
            fresh = self.buffer.len(),
            "fetched feed page"
        );

        self.page = Some(page.cursor);
        self.next = page.next;
        self.loaded = true;
        Ok(())
    }
}
