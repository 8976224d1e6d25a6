//! Embedding task model.

#[cfg(feature = "config")]
use clap::ValueEnum;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the queue or for a retry.
    #[default]
    Pending,
    /// Owned by a worker.
    Processing,
    /// Every chunk was embedded and persisted.
    Completed,
    /// Retries are exhausted.
    Failed,
    /// Cancelled by a caller or by worker shutdown.
    Cancelled,
}

impl TaskStatus {
    /// Returns true for states that never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the task may still be cancelled.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Task priority.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter
)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Regular ingestion.
    #[default]
    Normal,
    /// User-facing ingestion.
    High,
    /// Jumps ahead of everything else.
    Urgent,
}

impl TaskPriority {
    /// Weight used in the queue score.
    pub fn weight(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

/// Request to embed one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmbeddingTask {
    /// Document to embed.
    pub document_id: Uuid,
    /// Knowledge base the document belongs to.
    pub knowledge_base_id: Uuid,
    /// Full document text.
    pub content: String,
    /// Caller metadata copied onto every chunk record.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Queue priority.
    #[serde(default)]
    pub priority: TaskPriority,
    /// User whose keys and limits apply.
    pub user_id: Uuid,
}

impl NewEmbeddingTask {
    /// Creates a request with normal priority and no metadata.
    pub fn new(
        document_id: Uuid,
        knowledge_base_id: Uuid,
        content: impl Into<String>,
        user_id: Uuid,
    ) -> Self {
        Self {
            document_id,
            knowledge_base_id,
            content: content.into(),
            metadata: serde_json::Value::Null,
            priority: TaskPriority::Normal,
            user_id,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the caller metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A document embedding task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTask {
    /// Task identifier.
    pub id: Uuid,
    /// Document being embedded.
    pub document_id: Uuid,
    /// Knowledge base of the document.
    pub knowledge_base_id: Uuid,
    /// Requesting user.
    pub user_id: Uuid,
    /// Full document text.
    pub content: String,
    /// Caller metadata.
    pub metadata: serde_json::Value,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Queue priority.
    pub priority: TaskPriority,
    /// Percentage of chunks processed in the current attempt.
    pub progress_pct: u8,
    /// Chunks produced by splitting; zero until processing starts.
    pub total_chunks: usize,
    /// Chunks handled so far in the current attempt.
    pub processed_chunks: usize,
    /// Chunks that failed to embed or persist in the current attempt.
    pub failed_chunks: usize,
    /// Retries performed so far.
    pub retry_count: u32,
    /// Estimated seconds until completion.
    pub eta_secs: Option<u64>,
    /// Message of the last failure.
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Start of the current attempt.
    pub started_at: Option<Timestamp>,
    /// Time the task reached a terminal state.
    pub completed_at: Option<Timestamp>,
}

impl EmbeddingTask {
    /// Creates a pending task from a request.
    pub fn new(request: NewEmbeddingTask) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id: request.document_id,
            knowledge_base_id: request.knowledge_base_id,
            user_id: request.user_id,
            content: request.content,
            metadata: request.metadata,
            status: TaskStatus::Pending,
            priority: request.priority,
            progress_pct: 0,
            total_chunks: 0,
            processed_chunks: 0,
            failed_chunks: 0,
            retry_count: 0,
            eta_secs: None,
            error_message: None,
            created_at: Timestamp::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the progress view of this task.
    pub fn progress(&self) -> TaskProgress {
        TaskProgress {
            task_id: self.id,
            status: self.status,
            progress_pct: self.progress_pct,
            total_chunks: self.total_chunks,
            processed_chunks: self.processed_chunks,
            eta_secs: self.eta_secs,
            retry_count: self.retry_count,
            error_message: self.error_message.clone(),
        }
    }
}

/// Progress snapshot of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Task identifier.
    pub task_id: Uuid,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Percentage of chunks processed.
    pub progress_pct: u8,
    /// Total chunks.
    pub total_chunks: usize,
    /// Processed chunks.
    pub processed_chunks: usize,
    /// Estimated seconds until completion; `None` until a batch finished.
    pub eta_secs: Option<u64>,
    /// Retries performed so far.
    pub retry_count: u32,
    /// Message of the last failure.
    pub error_message: Option<String>,
}

/// One persisted chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingChunkRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Task that produced the record.
    pub task_id: Uuid,
    /// Source document.
    pub document_id: Uuid,
    /// Knowledge base of the document.
    pub knowledge_base_id: Uuid,
    /// Generation pass that produced the record, equal to the task's
    /// `retry_count` at the time. `chunk_index` is unique within a pass.
    pub attempt: u32,
    /// Position of the chunk in the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub content: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Token count of the chunk.
    pub token_count: u64,
    /// Provider, model and caller metadata.
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(TaskStatus::Pending.is_cancellable());
        assert!(TaskStatus::Processing.is_cancellable());
        assert!(!TaskStatus::Completed.is_cancellable());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert_eq!(TaskStatus::Processing.as_ref(), "PROCESSING");
    }

    #[test]
    fn test_priority_weights_increase() {
        use strum::IntoEnumIterator;
        let weights: Vec<u8> = TaskPriority::iter().map(TaskPriority::weight).collect();
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = EmbeddingTask::new(NewEmbeddingTask::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "content",
            Uuid::new_v4(),
        ));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress().eta_secs, None);
        assert_eq!(task.retry_count, 0);
    }
}
