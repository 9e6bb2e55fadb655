//! Configuration types for feed-dl

use crate::error::{Error, Result};
use crate::types::{Cursor, FeedKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where and how to read the feed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the feed API (default: "https://www.virustotal.com/api/v3")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Feed to read (default: files)
    #[serde(default)]
    pub kind: FeedKind,

    /// Position to resume from (None = start of the feed)
    #[serde(default)]
    pub cursor: Option<Cursor>,

    /// Keep polling the last page for new items instead of stopping (default: true)
    #[serde(default = "default_true")]
    pub follow: bool,

    /// Wait between polls of the last page in follow mode (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Timeout for a single HTTP request (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            kind: FeedKind::default(),
            cursor: None,
            follow: true,
            poll_interval: default_poll_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry behaviour for content downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// API key sent with every feed and content request
    #[serde(default)]
    pub api_key: String,

    /// Directory receiving `<id>.json` and `<id>` artifacts (default: "./file-feed")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of concurrent workers (default: 4)
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Queue capacity (None = same as `num_workers`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Attribute holding the content download locator (default: "download_url")
    #[serde(default = "default_content_reference_key")]
    pub content_reference_key: String,

    /// Feed settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Content download retry settings
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            output_dir: default_output_dir(),
            num_workers: default_num_workers(),
            queue_capacity: None,
            content_reference_key: default_content_reference_key(),
            feed: FeedConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Queue capacity actually used by the pipeline
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.num_workers)
    }

    /// Check the configuration before any task is started
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config("api_key", "an API key is required"));
        }
        if self.num_workers == 0 {
            return Err(Error::config("num_workers", "must be at least 1"));
        }

        let capacity = self.effective_queue_capacity();
        if capacity == 0 {
            return Err(Error::config("queue_capacity", "must be at least 1"));
        }
        if capacity < self.num_workers {
            tracing::warn!(
                capacity,
                num_workers = self.num_workers,
                "queue capacity is smaller than the worker count; some workers will idle"
            );
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::config("output_dir", "output directory is empty"));
        }
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(Error::config(
                "output_dir",
                format!("{} exists and is not a directory", self.output_dir.display()),
            ));
        }

        if self.content_reference_key.is_empty() {
            return Err(Error::config(
                "content_reference_key",
                "content reference key is empty",
            ));
        }

        url::Url::parse(&self.feed.base_url).map_err(|e| {
            Error::config("feed.base_url", format!("{}: {}", self.feed.base_url, e))
        })?;

        self.retry.validate()
    }
}

impl RetryConfig {
    /// Check the backoff settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a multiplier that is not a finite number of at least
    /// 1.0, or an initial delay longer than the maximum delay.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!(
                    "must be a finite number >= 1.0, got {}",
                    self.backoff_multiplier
                ),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::config(
                "retry.initial_delay",
                format!(
                    "{:?} is longer than retry.max_delay ({:?})",
                    self.initial_delay, self.max_delay
                ),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://www.virustotal.com/api/v3".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./file-feed")
}

fn default_num_workers() -> usize {
    4
}

fn default_content_reference_key() -> String {
    "download_url".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
