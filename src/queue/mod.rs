//! Bounded frame queue with drop-oldest backpressure
//!
//! Each session owns two of these: the input queue (ingestion → worker) and
//! the output queue (worker → relay). Producers never wait: when the queue is
//! full the oldest pending frame is evicted so the newest one always gets in.
//! Consumers wait with a timeout so they can notice cancellation promptly.
//!
//! ```text
//!   try_put(f4)            capacity = 3
//!   ┌────┬────┬────┐       ┌────┬────┬────┐
//!   │ f1 │ f2 │ f3 │  ──►  │ f2 │ f3 │ f4 │   (f1 evicted)
//!   └────┴────┴────┘       └────┴────┴────┘
//! ```
//!
//! End of stream is a separate state rather than a special frame value:
//! [`FrameQueue::close`] marks the queue so that, once pending items are
//! consumed, [`FrameQueue::get`] reports [`Recv::End`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

/// Result of waiting on a queue
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// A queued item
    Item(T),
    /// The queue was closed and every item before the close has been taken
    End,
    /// Nothing arrived within the timeout
    TimedOut,
}

/// Result of a non-blocking put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Item stored without displacing anything
    Stored,
    /// Item stored after evicting the oldest pending item
    Evicted,
    /// Queue is closed; item discarded
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    /// `close()` has been called
    closed: bool,
    /// The end marker has been handed to a consumer
    ended: bool,
}

/// Fixed-capacity FIFO with newest-wins overflow
pub struct FrameQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
                ended: false,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an item without waiting
    ///
    /// When the queue is full the oldest item is dropped to make room.
    pub fn try_put(&self, item: T) -> PutOutcome {
        let mut inner = self.lock();
        if inner.closed {
            return PutOutcome::Closed;
        }

        let outcome = if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            PutOutcome::Evicted
        } else {
            PutOutcome::Stored
        };
        inner.items.push_back(item);
        drop(inner);

        self.notify.notify_one();
        outcome
    }

    /// Take the next item without waiting
    ///
    /// Returns `None` when the queue is empty and still open.
    pub fn try_get(&self) -> Option<Recv<T>> {
        let mut inner = self.lock();
        if let Some(item) = inner.items.pop_front() {
            return Some(Recv::Item(item));
        }
        if inner.closed {
            inner.ended = true;
            return Some(Recv::End);
        }
        None
    }

    /// Wait up to `timeout` for the next item
    ///
    /// The end marker is enqueued once, by the first [`close`](Self::close),
    /// and is never evicted. After it has been taken the queue is terminal:
    /// every later `get` reports [`Recv::End`] again without waiting.
    pub async fn get(&self, timeout: Duration) -> Recv<T> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a put in between is not missed
            let notified = self.notify.notified();
            if let Some(recv) = self.try_get() {
                return recv;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_get().unwrap_or(Recv::TimedOut);
            }
        }
    }

    /// Mark end of stream
    ///
    /// Items already queued are still delivered, followed by a single
    /// [`Recv::End`]. Returns `true` on the first call only.
    pub fn close(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.closed = true;
        drop(inner);

        // Every waiting consumer sees the end marker
        self.notify.notify_waiters();
        true
    }

    /// Discard every pending item, returning how many were dropped
    pub fn drain(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        dropped
    }

    /// Number of pending items
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Check if no items are pending
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Maximum number of pending items
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Check if the end marker has been delivered
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }
}

impl<T> std::fmt::Debug for FrameQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("FrameQueue")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn drain_items(queue: &FrameQueue<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some(Recv::Item(item)) = queue.try_get() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_put_within_capacity() {
        let queue = FrameQueue::new(3);
        assert_eq!(queue.try_put(1), PutOutcome::Stored);
        assert_eq!(queue.try_put(2), PutOutcome::Stored);
        assert_eq!(queue.len(), 2);
        assert_eq!(drain_items(&queue), vec![1, 2]);
    }

    #[test]
    fn test_drop_oldest_keeps_most_recent() {
        let queue = FrameQueue::new(3);
        let mut evicted = 0;
        for i in 0..10 {
            if queue.try_put(i) == PutOutcome::Evicted {
                evicted += 1;
            }
        }

        assert_eq!(evicted, 7);
        assert_eq!(queue.len(), 3);
        assert_eq!(drain_items(&queue), vec![7, 8, 9]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.try_put(1);
        assert_eq!(queue.try_put(2), PutOutcome::Evicted);
        assert_eq!(drain_items(&queue), vec![2]);
    }

    #[test]
    fn test_close_delivers_pending_then_end_once() {
        let queue = FrameQueue::new(2);
        queue.try_put(1);
        queue.try_put(2);

        assert!(queue.close());
        assert!(!queue.close());
        assert_eq!(queue.try_put(3), PutOutcome::Closed);

        assert_eq!(queue.try_get(), Some(Recv::Item(1)));
        assert_eq!(queue.try_get(), Some(Recv::Item(2)));
        assert!(!queue.is_ended());
        assert_eq!(queue.try_get(), Some(Recv::End));
        assert!(queue.is_ended());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_discards_pending() {
        let queue = FrameQueue::new(4);
        queue.try_put(1);
        queue.try_put(2);

        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.try_get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_times_out() {
        let queue: FrameQueue<u32> = FrameQueue::new(2);
        let started = Instant::now();

        assert_eq!(queue.get(Duration::from_millis(500)).await, Recv::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_get_wakes_on_put() {
        let queue = Arc::new(FrameQueue::new(2));

        let mut waiting = task::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.get(Duration::from_secs(60)).await }
        });
        assert_pending!(waiting.poll());

        queue.try_put(42u32);
        assert!(waiting.is_woken());
        assert_ready_eq!(waiting.poll(), Recv::Item(42));
    }

    #[tokio::test]
    async fn test_get_wakes_on_close() {
        let queue: Arc<FrameQueue<u32>> = Arc::new(FrameQueue::new(2));

        let mut waiting = task::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.get(Duration::from_secs(60)).await }
        });
        assert_pending!(waiting.poll());

        queue.close();
        assert!(waiting.is_woken());
        assert_ready_eq!(waiting.poll(), Recv::End);
    }

    #[tokio::test]
    async fn test_end_is_terminal() {
        let queue: FrameQueue<u32> = FrameQueue::new(2);
        queue.try_put(1);
        queue.close();

        assert_eq!(queue.get(Duration::from_millis(10)).await, Recv::Item(1));
        assert_eq!(queue.get(Duration::from_millis(10)).await, Recv::End);

        // No second marker, no new items; the end state is simply reported again
        assert!(!queue.close());
        assert_eq!(queue.try_put(2), PutOutcome::Closed);
        assert_eq!(queue.get(Duration::from_millis(10)).await, Recv::End);
        assert!(queue.is_ended());
    }
}
