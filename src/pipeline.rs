//! Pipeline orchestration: one producer, N workers, one bounded queue, one abort flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::content::{ContentFetcher, HttpContentFetcher};
use crate::error::{Error, Result};
use crate::feed::{FeedClient, FeedSource, HttpFeedClient};
use crate::queue::{BoundedQueue, QueueClosed};
use crate::shutdown::ShutdownController;
use crate::store::ArtifactStore;
use crate::types::{Cursor, Event, Item, PipelineState, RunSummary, WorkerStats};
use crate::worker::Worker;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Owns the producer and worker tasks for one run and reports the final feed position
pub struct PipelineRunner {
    config: Arc<Config>,
    feed: Arc<dyn FeedClient>,
    fetcher: Arc<dyn ContentFetcher>,
    shutdown: ShutdownController,
    event_tx: broadcast::Sender<Event>,
    production_done: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    started: AtomicBool,
}

impl PipelineRunner {
    /// Create a runner over the given feed and content collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid; nothing is started.
    pub fn new(
        config: Config,
        feed: Arc<dyn FeedClient>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            feed,
            fetcher,
            shutdown: ShutdownController::new(),
            event_tx,
            production_done: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        })
    }

    /// Create a runner talking to the HTTP feed and content endpoints
    pub fn with_http(config: Config) -> Result<Self> {
        let feed = Arc::new(HttpFeedClient::new(&config)?);
        let fetcher = Arc::new(HttpContentFetcher::new(&config)?);
        Self::new(config, feed, fetcher)
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Handle for requesting an abort from outside the pipeline
    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        if self.stopped.load(Ordering::SeqCst) {
            PipelineState::Stopped
        } else if self.shutdown.is_aborted() || self.production_done.load(Ordering::SeqCst) {
            PipelineState::Draining
        } else {
            PipelineState::Running
        }
    }

    /// Run with SIGINT/SIGTERM wired to [`ShutdownController::request_abort`]
    pub async fn run_with_signals(&self) -> Result<RunSummary> {
        let listener = self.shutdown.listen_for_signals();
        let result = self.run().await;
        listener.abort();
        result
    }

    /// Run the pipeline until the feed ends or an abort has been fully drained
    ///
    /// Starts one producer and `num_workers` workers, waits for every worker to exit,
    /// then returns the producer's final position in [`RunSummary::cursor`]. A worker
    /// task that dies (panics) requests an abort so the rest of the pipeline drains.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if this runner has run before; build a new
    /// runner with the returned cursor to continue.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }
        let config = &self.config;
        let store = ArtifactStore::new(&config.output_dir);
        store.prepare().await.map_err(|e| {
            Error::config(
                "output_dir",
                format!("cannot create {}: {}", config.output_dir.display(), e),
            )
        })?;

        let queue = Arc::new(BoundedQueue::new(config.effective_queue_capacity()));
        tracing::info!(
            num_workers = config.num_workers,
            capacity = queue.capacity(),
            kind = %config.feed.kind,
            cursor = config.feed.cursor.as_ref().map(ToString::to_string).unwrap_or_default(),
            output_dir = %config.output_dir.display(),
            "starting feed pipeline"
        );

        let source = FeedSource::from_config(self.feed.clone(), &config.feed, self.shutdown.clone());
        let producer = tokio::spawn(produce(
            source,
            ProducerGuard {
                queue: queue.clone(),
                done: self.production_done.clone(),
            },
            self.shutdown.clone(),
            self.event_tx.clone(),
        ));

        let reference_key: Arc<str> = Arc::from(config.content_reference_key.as_str());
        let mut workers: FuturesUnordered<_> = (0..config.num_workers)
            .map(|index| {
                tokio::spawn(
                    Worker {
                        index,
                        queue: queue.clone(),
                        fetcher: self.fetcher.clone(),
                        store: store.clone(),
                        content_reference_key: reference_key.clone(),
                        event_tx: self.event_tx.clone(),
                        shutdown: self.shutdown.clone(),
                    }
                    .run(),
                )
                .map(move |result| (index, result))
            })
            .collect();

        let mut totals = WorkerStats::default();
        let mut remaining = workers.len();
        while let Some((index, result)) = workers.next().await {
            remaining -= 1;
            match result {
                Ok(stats) => {
                    totals.completed += stats.completed;
                    totals.failed += stats.failed;
                }
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "worker task failed, aborting run");
                    self.shutdown.request_abort();
                    if remaining == 0 {
                        // Nobody is left to make room; release a producer waiting on it
                        queue.close();
                    }
                }
            }
        }

        let produced = producer
            .await
            .map_err(|e| Error::TaskFailed(format!("producer: {e}")))?;

        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.event_tx.send(Event::Stopped {
            cursor: produced.position.clone(),
        });

        let summary = RunSummary {
            cursor: produced.position,
            enqueued: produced.enqueued,
            completed: totals.completed,
            failed: totals.failed,
            feed_error: produced.error,
        };
        tracing::info!(
            cursor = summary.cursor.as_ref().map(ToString::to_string).unwrap_or_default(),
            enqueued = summary.enqueued,
            completed = summary.completed,
            failed = summary.failed,
            "feed pipeline stopped"
        );
        Ok(summary)
    }
}

/// Run a pipeline against the HTTP feed until it ends or the process is interrupted
///
/// Returns the final position; persist it and pass it back as `feed.cursor` to resume.
pub async fn run(config: Config) -> Result<Option<Cursor>> {
    let summary = PipelineRunner::with_http(config)?.run_with_signals().await?;
    Ok(summary.cursor)
}

struct ProducerOutcome {
    position: Option<Cursor>,
    enqueued: u64,
    error: Option<String>,
}

/// Closes the queue when the producer ends, including by panic, so workers can drain
struct ProducerGuard {
    queue: Arc<BoundedQueue<Item>>,
    done: Arc<AtomicBool>,
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        self.queue.close();
    }
}

async fn produce(
    mut source: FeedSource,
    guard: ProducerGuard,
    shutdown: ShutdownController,
    event_tx: broadcast::Sender<Event>,
) -> ProducerOutcome {
    let mut enqueued = 0;
    let mut error = None;

    loop {
        // Room first, then the item: an abort raised while the queue is full stops
        // production without pulling anything more from the feed
        let Ok(slot) = guard.queue.reserve().await else {
            tracing::warn!("queue closed under the producer");
            break;
        };

        match source.next_item().await {
            Ok(Some(item)) => {
                let id = item.id.clone();
                let cursor = item.position.clone();
                if let Err(QueueClosed(item)) = slot.put(item).await {
                    tracing::error!(item_id = %item.id, "queue closed under the producer");
                    break;
                }
                enqueued += 1;
                tracing::trace!(item_id = %id, cursor = %cursor, "item queued");
                let _ = event_tx.send(Event::ItemQueued { id, cursor });
            }
            Ok(None) => {
                let _ = event_tx.send(if shutdown.is_aborted() {
                    Event::AbortRequested
                } else {
                    Event::FeedExhausted
                });
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "feed failed, stopping production");
                let _ = event_tx.send(Event::FeedFailed {
                    error: e.to_string(),
                });
                error = Some(e.to_string());
                shutdown.request_abort();
                break;
            }
        }
    }

    drop(guard);
    ProducerOutcome {
        position: source.into_position(),
        enqueued,
        error,
    }
}
