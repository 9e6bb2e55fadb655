//! Worker loop: one of N identical consumers of the item queue.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::content::ContentFetcher;
use crate::error::{ContentFetchError, Result};
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownController;
use crate::store::ArtifactStore;
use crate::types::{Event, Item, WorkerStats};

/// Shared state for a single worker, reducing parameter passing from the runner
pub(crate) struct Worker {
    pub(crate) index: usize,
    pub(crate) queue: Arc<BoundedQueue<Item>>,
    pub(crate) fetcher: Arc<dyn ContentFetcher>,
    pub(crate) store: ArtifactStore,
    pub(crate) content_reference_key: Arc<str>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) shutdown: ShutdownController,
}

impl Worker {
    /// Process items until the queue is closed and empty
    ///
    /// Per-item failures are reported and counted; they never end the loop. Every
    /// dequeued item is marked done exactly once, whatever its outcome.
    pub(crate) async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        tracing::debug!(worker = self.index, "worker started");

        while let Some(item) = self.queue.get().await {
            let _done = TaskDone(&self.queue);
            match self.process(&item).await {
                Ok(bytes) => {
                    stats.completed += 1;
                    tracing::debug!(worker = self.index, item_id = %item.id, bytes, "item stored");
                    let _ = self.event_tx.send(Event::ItemCompleted {
                        id: item.id.clone(),
                        bytes,
                    });
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(worker = self.index, item_id = %item.id, error = %e, "item failed");
                    let _ = self.event_tx.send(Event::ItemFailed {
                        id: item.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            worker = self.index,
            aborted = self.shutdown.is_aborted(),
            completed = stats.completed,
            failed = stats.failed,
            "queue drained, worker exiting"
        );
        stats
    }

    /// Fetch one item's content and write both artifacts; returns the content size
    async fn process(&self, item: &Item) -> Result<u64> {
        let reference = item
            .content_reference(&self.content_reference_key)
            .ok_or_else(|| ContentFetchError::MissingReference {
                id: item.id.clone(),
                key: self.content_reference_key.to_string(),
            })?;

        let content = self.fetcher.fetch(reference).await?;
        self.store.write(item, &content).await?;

        Ok(content.len() as u64)
    }
}

/// Marks the current item done when dropped, including when processing panics
struct TaskDone<'a>(&'a BoundedQueue<Item>);

impl Drop for TaskDone<'_> {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attributes, Cursor};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves `content:<reference>`; fails references listed in `failing`
    struct FakeFetcher {
        failing: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn fetch(&self, reference: &str) -> std::result::Result<Vec<u8>, ContentFetchError> {
            self.seen.lock().unwrap().push(reference.to_string());
            if self.failing.iter().any(|f| f == reference) {
                return Err(ContentFetchError::Status {
                    status: 404,
                    reference: reference.to_string(),
                });
            }
            Ok(format!("content:{reference}").into_bytes())
        }
    }

    fn item(id: &str, with_reference: bool) -> Item {
        let mut context = Attributes::new();
        if with_reference {
            context.insert("download_url".to_string(), json!(format!("ref-{id}")));
        }
        Item {
            id: id.to_string(),
            attributes: Attributes::new(),
            context,
            position: Cursor::new("p", 1),
        }
    }

    struct PanickingFetcher;

    #[async_trait::async_trait]
    impl ContentFetcher for PanickingFetcher {
        async fn fetch(&self, _reference: &str) -> std::result::Result<Vec<u8>, ContentFetchError> {
            panic!("fetcher blew up");
        }
    }

    fn worker(
        queue: &Arc<BoundedQueue<Item>>,
        fetcher: Arc<dyn ContentFetcher>,
        dir: &std::path::Path,
    ) -> (Worker, broadcast::Receiver<Event>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        (
            Worker {
                index: 0,
                queue: queue.clone(),
                fetcher,
                store: ArtifactStore::new(dir),
                content_reference_key: Arc::from("download_url"),
                event_tx,
                shutdown: ShutdownController::new(),
            },
            event_rx,
        )
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_worker() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(4));
        let fetcher = Arc::new(FakeFetcher {
            failing: vec!["ref-b".to_string()],
            seen: Mutex::new(Vec::new()),
        });
        let (worker, mut events) = worker(&queue, fetcher.clone(), dir.path());

        for id in ["a", "b", "c"] {
            queue.put(item(id, true)).await.unwrap();
        }
        queue.close();

        let stats = worker.run().await;

        assert_eq!(stats, WorkerStats { completed: 2, failed: 1 });
        assert_eq!(*fetcher.seen.lock().unwrap(), ["ref-a", "ref-b", "ref-c"]);
        assert_eq!(std::fs::read(dir.path().join("a")).unwrap(), b"content:ref-a");
        assert!(dir.path().join("c.json").exists());
        assert!(!dir.path().join("b").exists());
        assert!(!dir.path().join("b.json").exists());

        assert!(matches!(events.recv().await.unwrap(), Event::ItemCompleted { ref id, .. } if id == "a"));
        assert!(matches!(events.recv().await.unwrap(), Event::ItemFailed { ref id, .. } if id == "b"));
        assert!(matches!(events.recv().await.unwrap(), Event::ItemCompleted { ref id, bytes } if id == "c" && bytes == 13));

        tokio::time::timeout(std::time::Duration::from_secs(1), queue.join())
            .await
            .expect("every item marked done");
    }

    #[tokio::test]
    async fn missing_reference_fails_item_without_fetching() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(1));
        let fetcher = Arc::new(FakeFetcher {
            failing: Vec::new(),
            seen: Mutex::new(Vec::new()),
        });
        let (worker, mut events) = worker(&queue, fetcher.clone(), dir.path());

        queue.put(item("orphan", false)).await.unwrap();
        queue.close();

        let stats = worker.run().await;

        assert_eq!(stats.failed, 1);
        assert!(fetcher.seen.lock().unwrap().is_empty());
        match events.recv().await.unwrap() {
            Event::ItemFailed { id, error } => {
                assert_eq!(id, "orphan");
                assert!(error.contains("download_url"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_waits_for_items_until_queue_closes() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(1));
        let fetcher = Arc::new(FakeFetcher {
            failing: Vec::new(),
            seen: Mutex::new(Vec::new()),
        });
        let (worker, _events) = worker(&queue, fetcher, dir.path());
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!handle.is_finished(), "idle worker keeps waiting");

        queue.put(item("late", true)).await.unwrap();
        queue.close();

        let stats = handle.await.unwrap();
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn panicking_item_is_still_marked_done() {
        let dir = tempdir().unwrap();
        let queue = Arc::new(BoundedQueue::new(1));
        let (worker, _events) = worker(&queue, Arc::new(PanickingFetcher), dir.path());

        queue.put(item("boom", true)).await.unwrap();
        let result = tokio::spawn(worker.run()).await;
        assert!(result.unwrap_err().is_panic());

        tokio::time::timeout(std::time::Duration::from_secs(1), queue.join())
            .await
            .expect("the taken item counts as done");
    }
}
