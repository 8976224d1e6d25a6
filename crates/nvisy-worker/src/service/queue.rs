//! Priority queue of pending task ids.
//!
//! Entries are ordered by `weight * SCORE_SCALE - enqueued_micros`; the highest
//! score leaves first, so higher priorities win and equal priorities are FIFO.
//! Removal is lazy: cancelled ids are dropped when they reach the top.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use jiff::Timestamp;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::TaskPriority;

/// Separates priority weights; larger than any microsecond timestamp.
const SCORE_SCALE: i128 = 10_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    score: i128,
    seq: u64,
    task_id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    heap: BinaryHeap<QueueEntry>,
    live: HashSet<Uuid>,
    next_seq: u64,
}

/// Shared priority queue with async waiting.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the queue score of an entry.
    pub fn score(priority: TaskPriority, enqueued_at: Timestamp) -> i128 {
        i128::from(priority.weight()) * SCORE_SCALE - i128::from(enqueued_at.as_microsecond())
    }

    /// Adds a task. Returns false if it is already queued.
    pub async fn push(&self, task_id: Uuid, priority: TaskPriority) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.live.insert(task_id) {
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(QueueEntry {
            score: Self::score(priority, Timestamp::now()),
            seq,
            task_id,
        });
        drop(inner);

        self.notify.notify_one();
        true
    }

    /// Removes the highest scored live task, if any.
    pub async fn pop(&self) -> Option<Uuid> {
        let mut inner = self.inner.lock().await;
        while let Some(entry) = inner.heap.pop() {
            if inner.live.remove(&entry.task_id) {
                return Some(entry.task_id);
            }
        }
        None
    }

    /// Waits until a task is available and removes it.
    pub async fn pop_wait(&self) -> Uuid {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task_id) = self.pop().await {
                return task_id;
            }
            notified.await;
        }
    }

    /// Removes a queued task. Returns true if it was queued.
    pub async fn remove(&self, task_id: Uuid) -> bool {
        self.inner.lock().await.live.remove(&task_id)
    }

    /// Returns true if the task is queued.
    pub async fn contains(&self, task_id: Uuid) -> bool {
        self.inner.lock().await.live.contains(&task_id)
    }

    /// Number of queued tasks.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.live.len()
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let queue = TaskQueue::new();
        let low = Uuid::new_v4();
        let high_first = Uuid::new_v4();
        let normal = Uuid::new_v4();
        let high_second = Uuid::new_v4();

        queue.push(low, TaskPriority::Low).await;
        queue.push(high_first, TaskPriority::High).await;
        queue.push(normal, TaskPriority::Normal).await;
        queue.push(high_second, TaskPriority::High).await;

        assert_eq!(queue.pop().await, Some(high_first));
        assert_eq!(queue.pop().await, Some(high_second));
        assert_eq!(queue.pop().await, Some(normal));
        assert_eq!(queue.pop().await, Some(low));
        assert_eq!(queue.pop().await, None);
    }

    #[test]
    fn test_score_orders_by_weight_before_time() {
        let earlier = Timestamp::UNIX_EPOCH;
        let later = Timestamp::now();
        assert!(TaskQueue::score(TaskPriority::High, later) > TaskQueue::score(TaskPriority::Normal, earlier));
        assert!(TaskQueue::score(TaskPriority::Normal, earlier) > TaskQueue::score(TaskPriority::Normal, later));
    }

    #[tokio::test]
    async fn test_remove_is_lazy() {
        let queue = TaskQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.push(a, TaskPriority::High).await;
        queue.push(b, TaskPriority::Low).await;

        assert!(queue.remove(a).await);
        assert!(!queue.remove(a).await);
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.pop().await, Some(b));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_push_ignored() {
        let queue = TaskQueue::new();
        let a = Uuid::new_v4();
        assert!(queue.push(a, TaskPriority::Normal).await);
        assert!(!queue.push(a, TaskPriority::High).await);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_pop_wait_wakes_on_push() {
        let queue = TaskQueue::new();
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop_wait().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let id = Uuid::new_v4();
        queue.push(id, TaskPriority::Normal).await;
        assert_eq!(waiter.await.unwrap(), id);
    }
}
