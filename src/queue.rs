//! Concurrent FIFO work queue with acknowledgment tracking
//!
//! [`WorkQueue`] is the rendezvous point between the coordinator and its
//! worker pools: multi-producer, multi-consumer, FIFO, with a count of
//! outstanding (pushed but unacknowledged) items and a [`WorkQueue::join`]
//! that blocks until that count reaches zero.
//!
//! End-of-work is signaled with [`WorkQueue::close`]: every consumer blocked
//! in [`WorkQueue::recv`] observes it (after the buffer drains) as `None` and
//! terminates. A close flag plus notify-all replaces an in-band sentinel
//! payload, so the item type stays free of reserved values.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Async multi-producer/multi-consumer FIFO queue with ack/join semantics
///
/// Protocol per pass: producers push every item, consumers `recv` + `ack`,
/// the coordinator `join`s (all items acknowledged) and only then `close`s.
/// Every dequeued item must be acknowledged exactly once, success or failure,
/// or `join` never returns.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    outstanding: AtomicUsize,
    push_notify: Notify,
    idle_notify: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            outstanding: AtomicUsize::new(0),
            push_notify: Notify::new(),
            idle_notify: Notify::new(),
        }
    }

    /// Enqueue an item and count it as outstanding until acknowledged
    ///
    /// Items must not be pushed after [`close`](Self::close); the pass
    /// protocol guarantees all pushes happen before the queue is closed.
    pub async fn push(&self, item: T) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        {
            let mut inner = self.inner.lock().await;
            debug_assert!(!inner.closed, "push after close violates the pass protocol");
            inner.items.push_back(item);
        }
        self.push_notify.notify_one();
    }

    /// Dequeue the next item, waiting if the queue is empty
    ///
    /// Returns `None` once the queue has been closed and the buffer has
    /// drained. Every consumer blocked here observes the close.
    pub async fn recv(&self) -> Option<T> {
        loop {
            // Register for wakeups before checking state, otherwise a push or
            // close landing in between would be missed.
            let notified = self.push_notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Acknowledge one previously dequeued item
    pub fn ack(&self) {
        let prev = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "ack without a matching push");
        if prev == 1 {
            self.idle_notify.notify_waiters();
        }
    }

    /// Count of pushed-but-unacknowledged items
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every pushed item has been acknowledged
    pub async fn join(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if self.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close the queue: consumers drain the buffer and then observe `None`
    ///
    /// Idempotent; there is one logical end-of-work signal per pass.
    pub async fn close(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
        }
        self.push_notify.notify_waiters();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order_single_consumer() {
        let queue = WorkQueue::new();
        queue.push(1).await;
        queue.push(2).await;
        queue.push(3).await;

        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, Some(2));
        assert_eq!(queue.recv().await, Some(3));
    }

    #[tokio::test]
    async fn join_returns_once_all_items_acknowledged() {
        let queue = Arc::new(WorkQueue::new());
        for i in 0..5 {
            queue.push(i).await;
        }

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                while let Some(_item) = queue.recv().await {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    queue.ack();
                }
            })
        };

        queue.join().await;
        assert_eq!(queue.outstanding(), 0);

        queue.close().await;
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn join_blocks_while_item_unacknowledged() {
        let queue = Arc::new(WorkQueue::new());
        queue.push("a").await;
        queue.recv().await.unwrap();

        // Item dequeued but not acked: join must not complete
        let result = tokio::time::timeout(Duration::from_millis(50), queue.join()).await;
        assert!(result.is_err(), "join completed with an unacked item");

        queue.ack();
        tokio::time::timeout(Duration::from_millis(50), queue.join())
            .await
            .expect("join should return after the final ack");
    }

    #[tokio::test]
    async fn close_wakes_every_blocked_consumer() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new());

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move { queue.recv().await }));
        }

        // Give consumers time to block on the empty queue
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        for consumer in consumers {
            let got = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .expect("consumer did not observe close")
                .unwrap();
            assert_eq!(got, None);
        }
    }

    #[tokio::test]
    async fn buffered_items_drain_before_close_is_observed() {
        let queue = WorkQueue::new();
        queue.push(7).await;
        queue.close().await;

        assert_eq!(queue.recv().await, Some(7));
        assert_eq!(queue.recv().await, None);
        assert_eq!(queue.recv().await, None, "close is sticky");
    }

    #[tokio::test]
    async fn multiple_consumers_process_every_item_exactly_once() {
        let queue = Arc::new(WorkQueue::new());
        let n = 100;
        for i in 0..n {
            queue.push(i).await;
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            let seen = Arc::clone(&seen);
            workers.push(tokio::spawn(async move {
                while let Some(item) = queue.recv().await {
                    seen.lock().await.push(item);
                    queue.ack();
                }
            }));
        }

        queue.join().await;
        queue.close().await;
        for worker in workers {
            worker.await.unwrap();
        }

        let mut seen = seen.lock().await.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn join_on_empty_queue_returns_immediately() {
        let queue: WorkQueue<u8> = WorkQueue::new();
        tokio::time::timeout(Duration::from_millis(50), queue.join())
            .await
            .expect("join on an empty queue should not block");
    }
}
