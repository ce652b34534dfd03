use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::job::WorkItem;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("dequeue cancelled")]
    Cancelled,
}

/// Unbounded in-memory FIFO of deferred ingestion work.
///
/// Any number of producers may enqueue. Items are handed out in strict
/// insertion order and are never retried.
#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    available: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item at the tail without blocking
    pub fn enqueue(&self, item: WorkItem) {
        let depth = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            items.push_back(item);
            items.len()
        };
        debug!("Enqueued work item, queue depth {}", depth);
        self.available.notify_one();
    }

    /// Wait for the next item, or fail with [`QueueError::Cancelled`] once the
    /// token fires.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<WorkItem, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            if let Some(item) = self.try_dequeue() {
                return Ok(item);
            }

            // notify_one stores a permit when nobody is waiting, so an enqueue
            // landing between the pop above and this await is not lost.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = self.available.notified() => {}
            }
        }
    }

    /// Pop the head if there is one
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queued items in dequeue order
    pub fn pending(&self) -> Vec<WorkItem> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePath;
    use crate::job::TaskKind;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn item(name: &str) -> WorkItem {
        WorkItem::new(
            TaskKind::MobileResize,
            "bob",
            Path::new(name),
            CachePath::from_parts("c1", format!("{}.jpg", name)),
            format!("c{}", name),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();

        queue.enqueue(item("one"));
        queue.enqueue(item("two"));
        queue.enqueue(item("three"));
        assert_eq!(queue.len(), 3);

        let names: Vec<_> = queue
            .pending()
            .into_iter()
            .map(|i| i.source)
            .collect();
        assert_eq!(names.len(), 3);

        assert_eq!(queue.dequeue(&cancel).await.unwrap().source, Path::new("one"));
        assert_eq!(queue.dequeue(&cancel).await.unwrap().source, Path::new("two"));
        assert_eq!(queue.dequeue(&cancel).await.unwrap().source, Path::new("three"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(item("late"));

        let received = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.source, Path::new("late"));
    }

    #[tokio::test]
    async fn test_dequeue_cancelled_while_blocked() {
        let queue = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins_over_pending_items() {
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        queue.enqueue(item("left-behind"));
        cancel.cancel();

        assert_eq!(queue.dequeue(&cancel).await, Err(QueueError::Cancelled));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let queue = Arc::new(WorkQueue::new());
        let mut handles = Vec::new();

        for n in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for m in 0..10 {
                    queue.enqueue(item(&format!("{}-{}", n, m)));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len(), 80);
    }
}
