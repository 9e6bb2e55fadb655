//! # feed-dl
//!
//! Resumable consumer for cursor-addressable item feeds.
//!
//! One producer pulls items from the feed and places them on a bounded queue; N
//! workers take items off the queue, download each item's content, and write two
//! artifacts per item: `<id>.json` (the attribute mapping) and `<id>` (the raw bytes).
//!
//! An interrupt only sets a cooperative abort flag. The producer stops pulling, the
//! workers finish everything already queued, and the run reports the feed position
//! of the last item pulled so the next run can resume there.
//!
//! ## Quick Start
//!
//! ```no_run
//! use feed_dl::{Config, PipelineRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         api_key: "your-api-key".to_string(),
//!         num_workers: 8,
//!         ..Default::default()
//!     };
//!
//!     let runner = PipelineRunner::with_http(config)?;
//!
//!     let mut events = runner.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = runner.run_with_signals().await?;
//!     if let Some(cursor) = summary.cursor {
//!         println!("resume from {cursor}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Content download
pub mod content;
/// Error types
pub mod error;
/// Feed consumption and position tracking
pub mod feed;
/// Pipeline orchestration
pub mod pipeline;
/// Bounded producer/consumer queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Cooperative abort handling
pub mod shutdown;
/// Output artifact persistence
pub mod store;
/// Core types and events
pub mod types;

mod worker;

// Re-export commonly used types
pub use config::{Config, FeedConfig, RetryConfig};
pub use content::{ContentFetcher, HttpContentFetcher};
pub use error::{ContentFetchError, Error, FeedError, PersistenceError, Result};
pub use feed::{FeedClient, FeedEntry, FeedPage, FeedSource, HttpFeedClient};
pub use pipeline::{PipelineRunner, run};
pub use queue::BoundedQueue;
pub use shutdown::ShutdownController;
pub use store::ArtifactStore;
pub use types::{
    Attributes, Cursor, Event, FeedKind, Item, PipelineState, RunSummary, WorkerStats,
};
