//! Task service facade.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    EmbeddingTask, NewEmbeddingTask, QueueStats, TaskProgress, TaskStatus, WorkerState,
};
use crate::handler::TaskWorker;
use crate::{Result, TRACING_TARGET_TASKS, WorkerError};

/// Entry point for queuing and tracking document embedding tasks.
#[derive(Debug, Clone)]
pub struct EmbeddingTaskService {
    state: WorkerState,
}

impl EmbeddingTaskService {
    /// Creates a service over shared worker state.
    pub fn new(state: WorkerState) -> Self {
        Self { state }
    }

    /// Returns the shared worker state.
    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Spawns a worker that drains the queue until `cancel_token` fires.
    pub fn spawn_worker(&self, cancel_token: CancellationToken) -> JoinHandle<Result<()>> {
        TaskWorker::new(self.state.clone(), cancel_token).spawn()
    }

    /// Stores a pending task and queues it.
    ///
    /// # Errors
    ///
    /// Fails if the document content is empty.
    #[tracing::instrument(
        skip(self, request),
        target = TRACING_TARGET_TASKS,
        fields(document_id = %request.document_id, priority = %request.priority)
    )]
    pub async fn queue_embedding_task(&self, request: NewEmbeddingTask) -> Result<Uuid> {
        if request.content.trim().is_empty() {
            return Err(WorkerError::invalid_task("document content is empty"));
        }

        let task = EmbeddingTask::new(request);
        let (task_id, priority) = (task.id, task.priority);
        let content_len = task.content.len();

        self.state.tasks.insert(task).await;
        self.state.queue.push(task_id, priority).await;

        tracing::info!(
            target: TRACING_TARGET_TASKS,
            task_id = %task_id,
            content_len,
            "Queued embedding task"
        );

        Ok(task_id)
    }

    /// Returns the task record.
    pub async fn get_task_status(&self, task_id: Uuid) -> Option<EmbeddingTask> {
        self.state.tasks.get(task_id).await
    }

    /// Returns status, progress, ETA and retry information of a task.
    pub async fn get_task_progress(&self, task_id: Uuid) -> Option<TaskProgress> {
        self.state.tasks.get(task_id).await.map(|task| task.progress())
    }

    /// Cancels a pending or processing task.
    ///
    /// Returns false if the task is unknown or already finished. A running
    /// task stops after its current batch.
    pub async fn cancel_task(&self, task_id: Uuid) -> bool {
        if !self.state.tasks.cancel(task_id, None).await {
            return false;
        }

        self.state.queue.remove(task_id).await;
        tracing::info!(target: TRACING_TARGET_TASKS, task_id = %task_id, "Cancelled task");

        if let Some(task) = self.state.tasks.get(task_id).await
            && let Err(error) = self
                .state
                .notifier
                .push_completion(task_id, task.progress())
                .await
        {
            tracing::warn!(
                target: TRACING_TARGET_TASKS,
                task_id = %task_id,
                error = %error,
                "Failed to push cancellation"
            );
        }

        true
    }

    /// Lists retained tasks, optionally filtered by status, oldest first.
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<EmbeddingTask> {
        self.state.tasks.list(status).await
    }

    /// Returns task counts per status and the queue depth.
    pub async fn queue_stats(&self) -> QueueStats {
        let mut stats = self.state.tasks.counts().await;
        stats.queue_depth = self.state.queue.len().await;
        stats
    }
}
