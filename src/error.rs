//! Error types for feed-dl
//!
//! Errors are split along the pipeline's recovery boundaries:
//! - [`FeedError`] ends the producer, is turned into an abort so workers drain, and is
//!   reported in [`RunSummary::feed_error`](crate::types::RunSummary::feed_error)
//! - [`ContentFetchError`] and [`PersistenceError`] fail a single item only
//! - [`Error::Config`] is fatal before any task is launched

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for feed-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feed-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "num_workers")
        key: Option<String>,
    },

    /// Item content could not be downloaded
    #[error("content fetch error: {0}")]
    ContentFetch(#[from] ContentFetchError),

    /// Item artifacts could not be written
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Network error outside a feed or content request (client construction)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A pipeline task panicked or was cancelled
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The runner was asked to run a second time
    #[error("pipeline runner has already been started")]
    AlreadyStarted,
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Producer-side failures while pulling from the feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure talking to the feed endpoint
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Feed endpoint answered with a non-success status
    #[error("feed returned HTTP {status} for {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Feed answered with a body that is not a feed page
    #[error("invalid feed response: {0}")]
    InvalidResponse(String),
}

/// Worker-side failures while downloading one item's content
#[derive(Debug, Error)]
pub enum ContentFetchError {
    /// Item carries no content reference under the configured key
    #[error("item {id} has no content reference under {key:?}")]
    MissingReference {
        /// Item identifier
        id: String,
        /// Attribute key that was looked up
        key: String,
    },

    /// Transport failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Content endpoint answered with a non-success status
    #[error("content download returned HTTP {status} for {reference}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Content reference that was requested
        reference: String,
    },
}

/// Worker-side failures while writing one item's artifacts
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Identifier cannot be used as a file name
    #[error("item identifier {id:?} is not a valid file name")]
    InvalidIdentifier {
        /// Offending identifier
        id: String,
    },

    /// Writing an artifact failed
    #[error("failed to write {path}: {source}")]
    Write {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Attribute mapping could not be encoded as JSON
    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key() {
        let err = Error::config("num_workers", "must be at least 1");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("num_workers"));
                assert_eq!(message, "must be at least 1");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.to_string(), "configuration error: must be at least 1");
    }

    #[test]
    fn item_errors_convert_into_main_error() {
        let err: Error = ContentFetchError::Status {
            status: 404,
            reference: "https://example.com/x".into(),
        }
        .into();
        assert!(matches!(err, Error::ContentFetch(_)));
        assert!(err.to_string().contains("HTTP 404"));

        let err: Error = PersistenceError::InvalidIdentifier { id: "../x".into() }.into();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn feed_status_message_names_url() {
        let err = FeedError::Status {
            status: 503,
            url: "https://feed.example/feeds/files".into(),
        };
        assert_eq!(
            err.to_string(),
            "feed returned HTTP 503 for https://feed.example/feeds/files"
        );
    }
}
