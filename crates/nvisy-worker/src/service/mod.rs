//! Worker state and services.
//!
//! ## Services
//!
//! - [`EmbeddingTaskService`] - Queue, query and cancel document embedding tasks
//! - [`TextSplitterService`] - Overlapping document chunking
//! - [`TaskQueue`] - Priority queue of pending tasks
//! - [`TaskStore`] - Task records

mod config;
mod notifier;
mod queue;
mod store;
mod task;
mod tasks;
mod text_splitter;
mod vector_store;

use std::sync::Arc;

pub use config::WorkerConfig;
use nvisy_embedding::EmbeddingService;
pub use notifier::{BroadcastNotifier, ProgressNotifier, TaskEvent, TaskEventKind};
pub use queue::TaskQueue;
pub use store::{QueueStats, TaskStore};
pub use task::{
    EmbeddingChunkRecord, EmbeddingTask, NewEmbeddingTask, TaskPriority, TaskProgress, TaskStatus,
};
pub use tasks::EmbeddingTaskService;
pub use text_splitter::{ChunkingStrategy, TextChunk, TextSplitterConfig, TextSplitterService};
use tokio::sync::Semaphore;
pub use vector_store::{InMemoryVectorStore, VectorStore};

use crate::Result;

/// Shared state of the task service and its workers.
///
/// Cloning is cheap; clones share the task store and queue.
#[derive(Clone)]
pub struct WorkerState {
    /// Worker configuration.
    pub config: Arc<WorkerConfig>,
    /// Fallback embedding orchestrator.
    pub embedding: EmbeddingService,
    /// Document chunker.
    pub splitter: TextSplitterService,
    /// Task records.
    pub tasks: TaskStore,
    /// Pending task queue.
    pub queue: TaskQueue,
    /// Sink for chunk vectors.
    pub vector_store: Arc<dyn VectorStore>,
    /// Sink for progress events.
    pub notifier: Arc<dyn ProgressNotifier>,
}

impl std::fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerState")
            .field("config", &self.config)
            .field("embedding", &self.embedding)
            .finish_non_exhaustive()
    }
}

impl WorkerState {
    /// Creates worker state from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent.
    pub fn new(
        config: WorkerConfig,
        embedding: EmbeddingService,
        vector_store: Arc<dyn VectorStore>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Result<Self> {
        config.validate()?;

        let splitter = TextSplitterService::new(
            TextSplitterConfig::new(config.chunk_size)
                .with_overlap(config.chunk_overlap)
                .with_strategy(config.chunking_strategy),
        )?;

        Ok(Self {
            config: Arc::new(config),
            embedding,
            splitter,
            tasks: TaskStore::new(),
            queue: TaskQueue::new(),
            vector_store,
            notifier,
        })
    }

    /// Creates a semaphore for limiting concurrent task processing.
    pub(crate) fn create_semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.config.max_concurrent_tasks))
    }
}
