//! Core types for feed-dl

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Attribute mapping carried by every feed item (key → JSON value)
pub type Attributes = Map<String, Value>;

/// Position in a feed: the page an item came from plus how many items of that
/// page have been yielded.
///
/// Rendered as `<page>-<offset>`. The page token is opaque and may itself contain
/// dashes; the offset is always the part after the last one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor {
    page: String,
    offset: u64,
}

impl Cursor {
    /// Create a cursor pointing `offset` items into `page`
    pub fn new(page: impl Into<String>, offset: u64) -> Self {
        Self {
            page: page.into(),
            offset,
        }
    }

    /// Opaque page token
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Number of items of the page already consumed
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.page, self.offset)
    }
}

/// Error returned when a cursor string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cursor {0:?}: expected <page>-<offset>")]
pub struct ParseCursorError(String);

impl FromStr for Cursor {
    type Err = ParseCursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page, offset) = s
            .rsplit_once('-')
            .ok_or_else(|| ParseCursorError(s.to_string()))?;
        if page.is_empty() {
            return Err(ParseCursorError(s.to_string()));
        }
        let offset = offset
            .parse()
            .map_err(|_| ParseCursorError(s.to_string()))?;
        Ok(Self::new(page, offset))
    }
}

impl TryFrom<String> for Cursor {
    type Error = ParseCursorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.to_string()
    }
}

/// Which feed to read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Newly submitted files (default)
    #[default]
    Files,
    /// Newly analysed URLs
    Urls,
    /// Domain observations
    Domains,
    /// IP address observations
    IpAddresses,
    /// Sandbox behaviour reports
    FileBehaviours,
}

impl FeedKind {
    /// Path segment used by the feed endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Files => "files",
            FeedKind::Urls => "urls",
            FeedKind::Domains => "domains",
            FeedKind::IpAddresses => "ip_addresses",
            FeedKind::FileBehaviours => "file-behaviours",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "files" => Ok(FeedKind::Files),
            "urls" => Ok(FeedKind::Urls),
            "domains" => Ok(FeedKind::Domains),
            "ip_addresses" => Ok(FeedKind::IpAddresses),
            "file-behaviours" | "file_behaviours" => Ok(FeedKind::FileBehaviours),
            other => Err(format!("unknown feed kind: {other}")),
        }
    }
}

/// A single item yielded by the feed
///
/// Read-only once created; ownership moves from the producer, through the queue,
/// to exactly one worker.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Identifier, unique within the feed (also the output file stem)
    pub id: String,
    /// Attribute mapping persisted as the metadata artifact
    pub attributes: Attributes,
    /// Delivery context (download locators and the like); not persisted
    pub context: Attributes,
    /// Position of the feed once this item has been consumed
    pub position: Cursor,
}

impl Item {
    /// Look up the content reference under `key`, preferring the delivery context
    pub fn content_reference(&self, key: &str) -> Option<&str> {
        self.context
            .get(key)
            .or_else(|| self.attributes.get(key))
            .and_then(Value::as_str)
    }
}

/// Lifecycle of a pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Producer and workers active
    Running,
    /// Abort requested; workers finishing queued items
    Draining,
    /// Producer and every worker have exited
    Stopped,
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Item pulled from the feed and placed on the queue
    ItemQueued {
        /// Item identifier
        id: String,
        /// Feed position after this item
        cursor: Cursor,
    },

    /// Both artifacts written for an item
    ItemCompleted {
        /// Item identifier
        id: String,
        /// Size of the content artifact
        bytes: u64,
    },

    /// Item processed with an error (not redelivered)
    ItemFailed {
        /// Item identifier
        id: String,
        /// Error message
        error: String,
    },

    /// Abort was requested; no further items will be pulled
    AbortRequested,

    /// Feed has no more items
    FeedExhausted,

    /// Feed failed; treated as an abort so workers can drain
    FeedFailed {
        /// Error message
        error: String,
    },

    /// Producer and all workers have exited
    Stopped {
        /// Final feed position
        cursor: Option<Cursor>,
    },
}

/// Per-worker counters reported when a worker exits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items whose artifacts were written
    pub completed: u64,
    /// Items processed with an error
    pub failed: u64,
}

/// Outcome of [`PipelineRunner::run`](crate::pipeline::PipelineRunner::run)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Position of the last item the producer yielded; persist it to resume later
    pub cursor: Option<Cursor>,
    /// Items placed on the queue
    pub enqueued: u64,
    /// Items whose artifacts were written
    pub completed: u64,
    /// Items processed with an error
    pub failed: u64,
    /// Feed failure that ended production, if any
    pub feed_error: Option<String>,
}
