//! Bounded, ordered, in-memory message queue.
//!
//! Decouples event arrival (many concurrent producers) from delivery (a
//! single consumer). When full, the configured [`OverflowPolicy`] decides
//! whether the new item is rejected or the oldest one is evicted.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// What to do when enqueueing into a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the enqueue, leaving the queue unchanged.
    RejectNew,
    /// Evict the oldest item to make room for the new one.
    DropOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "reject_new" => Ok(Self::RejectNew),
            "drop_oldest" => Ok(Self::DropOldest),
            other => Err(format!(
                "unknown overflow policy {other:?} (expected reject_new or drop_oldest)"
            )),
        }
    }
}

/// Enqueue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,

    #[error("queue is closed")]
    Closed,
}

/// Returned by [`BoundedQueue::dequeue`] once the queue is closed and drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is closed")]
pub struct QueueClosed;

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub dropped: u64,
    pub closed: bool,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, single-consumer FIFO with a fixed capacity.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue. A zero capacity is treated as one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        // A poisoned lock only means a holder panicked; the deque itself is intact.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append an item at the back.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        if inner.items.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::RejectNew => return Err(QueueError::Full),
                OverflowPolicy::DropOldest => {
                    // A requeued item may have pushed us past capacity.
                    while inner.items.len() >= self.capacity {
                        inner.items.pop_front();
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(dropped, "Queue full, evicted oldest message");
                    }
                }
            }
        }
        inner.items.push_back(item);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Put an item back at the head of the queue.
    ///
    /// Used by the consumer for partially delivered items. Always accepted,
    /// even when full or closed, so ordering is preserved while draining.
    pub fn requeue_front(&self, item: T) {
        let mut inner = self.lock();
        inner.items.push_front(item);
        debug!(len = inner.items.len(), "Item requeued at front");
        drop(inner);
        self.notify.notify_one();
    }

    /// Wait for the next item.
    ///
    /// After [`close`](Self::close) the remaining items are still returned;
    /// once empty, every call yields [`QueueClosed`].
    pub async fn dequeue(&self) -> Result<T, QueueClosed> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Ok(item);
                }
                if inner.closed {
                    return Err(QueueClosed);
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Close the queue. Idempotent; wakes every waiting consumer.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let remaining = inner.items.len();
        drop(inner);
        debug!(remaining, "Queue closed");
        self.notify.notify_waiters();
        // notify_waiters stores no permit; cover a consumer between check and await.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Items evicted by [`OverflowPolicy::DropOldest`] so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.lock();
        QueueStats {
            len: inner.items.len(),
            capacity: self.capacity,
            dropped: self.dropped(),
            closed: inner.closed,
        }
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copy of the current contents, front first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.iter().cloned().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = BoundedQueue::new(16, OverflowPolicy::RejectNew);
        for i in 0..16 {
            queue.enqueue(i).unwrap();
        }
        for i in 0..16 {
            assert_eq!(queue.dequeue().await.unwrap(), i);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn reject_new_leaves_contents_unchanged() {
        let queue = BoundedQueue::new(3, OverflowPolicy::RejectNew);
        for i in 0..3 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.enqueue(99), Err(QueueError::Full));
        assert_eq!(queue.snapshot(), vec![0, 1, 2]);
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let queue = BoundedQueue::new(3, OverflowPolicy::DropOldest);
        for i in 0..3 {
            queue.enqueue(i).unwrap();
        }
        queue.enqueue(3).unwrap();
        assert_eq!(queue.snapshot(), vec![1, 2, 3]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn drop_oldest_after_overfull_requeue_restores_capacity() {
        let queue = BoundedQueue::new(2, OverflowPolicy::DropOldest);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        queue.requeue_front(0);
        assert_eq!(queue.len(), 3);
        queue.enqueue(3).unwrap();
        assert_eq!(queue.snapshot(), vec![2, 3]);
        assert_eq!(queue.dropped(), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(2, OverflowPolicy::RejectNew);
        queue.enqueue(1).unwrap();
        queue.close();
        let once = queue.stats();
        queue.close();
        assert_eq!(queue.stats(), once);
        assert_eq!(queue.enqueue(2), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_signals() {
        let queue = BoundedQueue::new(4, OverflowPolicy::RejectNew);
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();
        queue.close();
        assert_eq!(queue.dequeue().await, Ok("a"));
        assert_eq!(queue.dequeue().await, Ok("b"));
        assert_eq!(queue.dequeue().await, Err(QueueClosed));
        assert_eq!(queue.dequeue().await, Err(QueueClosed));
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4, OverflowPolicy::RejectNew));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(QueueClosed));
    }

    #[tokio::test]
    async fn blocked_consumer_receives_later_enqueue() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4, OverflowPolicy::RejectNew));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(7).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn requeue_front_jumps_the_line() {
        let queue = BoundedQueue::new(4, OverflowPolicy::RejectNew);
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        let first = queue.dequeue().await.unwrap();
        queue.enqueue(3).unwrap();
        queue.requeue_front(first);
        assert_eq!(queue.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn requeue_after_close_is_accepted() {
        let queue = BoundedQueue::new(1, OverflowPolicy::RejectNew);
        queue.close();
        queue.requeue_front(5);
        assert_eq!(queue.try_dequeue(), Some(5));
    }

    #[tokio::test]
    async fn concurrent_producers_keep_per_producer_order() {
        let queue: Arc<BoundedQueue<(u32, u32)>> =
            Arc::new(BoundedQueue::new(1000, OverflowPolicy::RejectNew));
        let mut handles = Vec::new();
        for producer in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                for seq in 0..100 {
                    queue.enqueue((producer, seq)).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let mut last = [None::<u32>; 4];
        while let Some((producer, seq)) = queue.try_dequeue() {
            let slot = &mut last[producer as usize];
            assert!(slot.is_none_or(|prev| prev < seq));
            *slot = Some(seq);
        }
        assert!(last.iter().all(|s| *s == Some(99)));
    }

    #[test]
    fn overflow_policy_parses() {
        assert_eq!(
            "reject_new".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::RejectNew)
        );
        assert_eq!(
            "Drop-Oldest".parse::<OverflowPolicy>(),
            Ok(OverflowPolicy::DropOldest)
        );
        assert!("lifo".parse::<OverflowPolicy>().is_err());
    }
}
