//! Bounded FIFO queue shared by the producer and the worker pool.
//!
//! Items travel over a bounded [`async_channel`] so any number of workers can take
//! from it. Room is handed out as a [`Slot`] before an item exists: the producer
//! reserves a slot, and only then pulls the next item from the feed. A producer
//! waiting on a full queue therefore never holds an item it has already pulled, and an
//! abort requested while it waits stops it before the feed is asked for anything else.
//!
//! Closing the queue is how the producer announces that nothing more will be put:
//! after [`BoundedQueue::close`], `get` keeps handing out the remaining items and
//! returns `None` once the queue is empty.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::{Receiver, SendError, Sender};
use tokio::sync::{Notify, Semaphore};

/// Returned when the queue was closed; hands back whatever was being put
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is closed")
    }
}

impl<T> std::error::Error for QueueClosed<T> {}

/// Fixed-capacity async FIFO with exactly-once delivery
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    /// Room not yet handed out as a [`Slot`]
    free: Semaphore,
    capacity: usize,
    /// Items put but not yet marked done
    unfinished: AtomicUsize,
    all_done: Notify,
}

/// Reserved room for exactly one item
///
/// Dropping a slot without putting into it gives the room back.
pub struct Slot<'a, T> {
    queue: &'a BoundedQueue<T>,
    filled: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (a capacity of zero is treated as one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        Self {
            tx,
            rx,
            free: Semaphore::new(capacity),
            capacity,
            unfinished: AtomicUsize::new(0),
            all_done: Notify::new(),
        }
    }

    /// Wait until there is room for one more item and claim it
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the queue is closed before room becomes available.
    pub async fn reserve(&self) -> Result<Slot<'_, T>, QueueClosed<()>> {
        let permit = self.free.acquire().await.map_err(|_| QueueClosed(()))?;
        permit.forget();
        Ok(Slot {
            queue: self,
            filled: false,
        })
    }

    /// Append an item, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// Returns the item inside [`QueueClosed`] if the queue has been closed.
    pub async fn put(&self, item: T) -> Result<(), QueueClosed<T>> {
        match self.reserve().await {
            Ok(slot) => slot.put(item).await,
            Err(QueueClosed(())) => Err(QueueClosed(item)),
        }
    }

    /// Take the oldest item, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and every item has been taken.
    pub async fn get(&self) -> Option<T> {
        let item = self.rx.recv().await.ok()?;
        self.free.add_permits(1);
        Some(item)
    }

    /// Mark one previously taken item as fully processed
    ///
    /// The pipeline itself drains by waiting for its workers to exit; this accounting
    /// is for callers that keep a queue open and need [`join`](Self::join).
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.all_done.notify_waiters();
        }
    }

    /// Wait until every item ever put has been marked with [`task_done`](Self::task_done)
    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Stop accepting items and wake everyone waiting on the queue
    pub fn close(&self) {
        self.tx.close();
        self.free.close();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether no item is waiting to be taken
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Number of items waiting to be taken
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Maximum number of items the queue holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Slot<'_, T> {
    /// Put `item` into the reserved room
    ///
    /// # Errors
    ///
    /// Returns the item inside [`QueueClosed`] if the queue was closed after the
    /// slot was reserved.
    pub async fn put(mut self, item: T) -> Result<(), QueueClosed<T>> {
        let queue = self.queue;
        queue.unfinished.fetch_add(1, Ordering::SeqCst);
        // Never waits: every slot is backed by free room in the channel
        match queue.tx.send(item).await {
            Ok(()) => {
                self.filled = true;
                Ok(())
            }
            Err(SendError(item)) => {
                queue.task_done();
                Err(QueueClosed(item))
            }
        }
    }
}

impl<T> Drop for Slot<'_, T> {
    fn drop(&mut self) {
        if !self.filled {
            self.queue.free.add_permits(1);
        }
    }
}
