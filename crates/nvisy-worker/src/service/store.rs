//! In-process registry of task records.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EmbeddingTask, TaskStatus};

/// Task counts per status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks waiting in the queue or for a retry.
    pub pending: usize,
    /// Tasks owned by a worker.
    pub processing: usize,
    /// Completed tasks still retained.
    pub completed: usize,
    /// Failed tasks still retained.
    pub failed: usize,
    /// Cancelled tasks still retained.
    pub cancelled: usize,
    /// Tasks currently in the priority queue.
    pub queue_depth: usize,
}

/// Task records keyed by id.
///
/// Records are only mutated by the worker that owns the task, except for
/// cancellation which any caller may request.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<Uuid, EmbeddingTask>>>,
}

impl TaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub async fn insert(&self, task: EmbeddingTask) {
        self.tasks.write().await.insert(task.id, task);
    }

    /// Returns a copy of a record.
    pub async fn get(&self, task_id: Uuid) -> Option<EmbeddingTask> {
        self.tasks.read().await.get(&task_id).cloned()
    }

    /// Returns the status of a task.
    pub async fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.tasks.read().await.get(&task_id).map(|t| t.status)
    }

    /// Applies `f` to a record and returns its result.
    pub async fn update<R>(&self, task_id: Uuid, f: impl FnOnce(&mut EmbeddingTask) -> R) -> Option<R> {
        self.tasks.write().await.get_mut(&task_id).map(f)
    }

    /// Moves a pending task to processing and resets per-attempt progress.
    ///
    /// Returns `None` if the task is missing or no longer pending.
    pub async fn begin_attempt(&self, task_id: Uuid) -> Option<EmbeddingTask> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&task_id)?;
        if task.status != TaskStatus::Pending {
            return None;
        }

        task.status = TaskStatus::Processing;
        task.started_at = Some(Timestamp::now());
        task.progress_pct = 0;
        task.total_chunks = 0;
        task.processed_chunks = 0;
        task.failed_chunks = 0;
        task.eta_secs = None;
        Some(task.clone())
    }

    /// Cancels a pending or processing task. Returns false otherwise.
    pub async fn cancel(&self, task_id: Uuid, reason: Option<&str>) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task_id) {
            Some(task) if task.status.is_cancellable() => {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Timestamp::now());
                task.eta_secs = None;
                if let Some(reason) = reason {
                    task.error_message = Some(reason.to_owned());
                }
                true
            }
            _ => false,
        }
    }

    /// Lists tasks, optionally filtered by status, oldest first.
    pub async fn list(&self, status: Option<TaskStatus>) -> Vec<EmbeddingTask> {
        let tasks = self.tasks.read().await;
        let mut list: Vec<_> = tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        list.sort_by_key(|t| (t.created_at, t.id));
        list
    }

    /// Counts tasks per status; `queue_depth` is left at zero.
    pub async fn counts(&self) -> QueueStats {
        let tasks = self.tasks.read().await;
        let mut stats = QueueStats::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Drops terminal tasks that finished more than `ttl` before `now`.
    pub async fn evict_expired(&self, now: Timestamp, ttl: Duration) -> usize {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| match (task.status.is_terminal(), task.completed_at) {
            (true, Some(completed_at)) => now.as_second() - completed_at.as_second() < ttl_secs,
            _ => true,
        });
        before - tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;

    use super::*;
    use crate::service::NewEmbeddingTask;

    fn task() -> EmbeddingTask {
        EmbeddingTask::new(NewEmbeddingTask::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "text",
            Uuid::new_v4(),
        ))
    }

    #[tokio::test]
    async fn test_begin_attempt_only_from_pending() {
        let store = TaskStore::new();
        let task = task();
        let id = task.id;
        store.insert(task).await;

        let started = store.begin_attempt(id).await.unwrap();
        assert_eq!(started.status, TaskStatus::Processing);
        assert!(started.started_at.is_some());
        assert!(store.begin_attempt(id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let store = TaskStore::new();
        let pending = task();
        let done = task();
        let (pending_id, done_id) = (pending.id, done.id);
        store.insert(pending).await;
        store.insert(done).await;
        store
            .update(done_id, |t| t.status = TaskStatus::Completed)
            .await;

        assert!(store.cancel(pending_id, None).await);
        assert_eq!(store.status(pending_id).await, Some(TaskStatus::Cancelled));
        assert!(!store.cancel(pending_id, None).await);
        assert!(!store.cancel(done_id, None).await);
        assert!(!store.cancel(Uuid::new_v4(), None).await);
    }

    #[tokio::test]
    async fn test_evict_expired_terminal_tasks() {
        let store = TaskStore::new();
        let finished = task();
        let running = task();
        let finished_id = finished.id;
        store.insert(finished).await;
        store.insert(running).await;
        store.cancel(finished_id, Some("stop")).await;

        let ttl = Duration::from_secs(24 * 3600);
        assert_eq!(store.evict_expired(Timestamp::now(), ttl).await, 0);
        assert_eq!(store.evict_expired(Timestamp::now() + 25.hours(), ttl).await, 1);
        assert_eq!(store.list(None).await.len(), 1);

        let stats = store.counts().await;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.cancelled, 0);
    }
}
