//! # Operation Queue
//!
//! Single FIFO of pending [`SyncOperation`]s drained by one consumer.
//!
//! Retries are re-appended at the back with a `next_attempt` time. The
//! consumer takes the first operation that is due, so a waiting retry never
//! blocks fresh work queued behind it.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = OperationQueue::new();
//! queue.enqueue(op).await;
//!
//! loop {
//!     match queue.pop_ready(clock.now()).await {
//!         Some(op) => execute(op).await,
//!         None => queue.notified().await,
//!     }
//! }
//! ```

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use crate::operation::{OperationType, SyncOperation};

/// Snapshot of the queue contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Operations that may run now
    pub ready: usize,
    /// Retries waiting for their next attempt
    pub waiting_retry: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct OperationQueue {
    items: Mutex<VecDeque<SyncOperation>>,
    notify: Notify,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation and wake the consumer
    pub async fn enqueue(&self, op: SyncOperation) {
        self.items.lock().await.push_back(op);
        self.notify.notify_one();
    }

    /// Remove and return the first operation due at `now`
    pub async fn pop_ready(&self, now: DateTime<Utc>) -> Option<SyncOperation> {
        let mut items = self.items.lock().await;
        let idx = items.iter().position(|op| op.is_due(now))?;
        items.remove(idx)
    }

    /// Earliest `next_attempt` among waiting retries
    pub async fn next_due(&self) -> Option<DateTime<Utc>> {
        self.items
            .lock()
            .await
            .iter()
            .filter_map(|op| op.next_attempt)
            .min()
    }

    /// Whether an operation of this type for this file is already queued
    pub async fn contains(&self, file_id: &str, operation_type: OperationType) -> bool {
        self.items
            .lock()
            .await
            .iter()
            .any(|op| op.file_id == file_id && op.operation_type == operation_type)
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> QueueStats {
        let items = self.items.lock().await;
        let ready = items.iter().filter(|op| op.is_due(now)).count();
        QueueStats {
            ready,
            waiting_retry: items.len() - ready,
            total: items.len(),
        }
    }

    /// Resolves on the next enqueue (or immediately if one was missed)
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::TargetAction;
    use chrono::Duration;

    fn op(file_id: &str) -> SyncOperation {
        SyncOperation::new(
            OperationType::DeleteInB,
            TargetAction::TombstoneInB {
                file_id: file_id.to_string(),
            },
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OperationQueue::new();
        queue.enqueue(op("f1")).await;
        queue.enqueue(op("f2")).await;

        let now = Utc::now();
        assert_eq!(queue.pop_ready(now).await.unwrap().file_id, "f1");
        assert_eq!(queue.pop_ready(now).await.unwrap().file_id, "f2");
        assert!(queue.pop_ready(now).await.is_none());
    }

    #[tokio::test]
    async fn test_waiting_retry_does_not_block() {
        let now = Utc::now();
        let queue = OperationQueue::new();

        let mut retry = op("f1");
        retry.next_attempt = Some(now + Duration::seconds(30));
        queue.enqueue(retry).await;
        queue.enqueue(op("f2")).await;

        let stats = queue.stats(now).await;
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.waiting_retry, 1);

        assert_eq!(queue.pop_ready(now).await.unwrap().file_id, "f2");
        assert!(queue.pop_ready(now).await.is_none());
        assert_eq!(queue.next_due().await, Some(now + Duration::seconds(30)));
        assert_eq!(
            queue.pop_ready(now + Duration::seconds(30)).await.unwrap().file_id,
            "f1"
        );
    }

    #[tokio::test]
    async fn test_contains() {
        let queue = OperationQueue::new();
        queue.enqueue(op("f1")).await;
        assert!(queue.contains("f1", OperationType::DeleteInB).await);
        assert!(!queue.contains("f1", OperationType::DeleteInA).await);
        assert_eq!(queue.len().await, 1);
    }
}
