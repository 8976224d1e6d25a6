#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for the task dispatcher.
pub const TRACING_TARGET_DISPATCHER: &str = "nvisy_worker::dispatcher";

/// Tracing target for per-task processing.
pub const TRACING_TARGET_PROCESSOR: &str = "nvisy_worker::processor";

/// Tracing target for the task service facade.
pub const TRACING_TARGET_TASKS: &str = "nvisy_worker::tasks";

mod error;
pub mod handler;
pub mod service;

pub use error::{Result, WorkerError};
pub use handler::TaskWorker;
pub use service::{
    ChunkingStrategy, EmbeddingChunkRecord, EmbeddingTask, EmbeddingTaskService, NewEmbeddingTask,
    TaskPriority, TaskProgress, TaskStatus, TextSplitterConfig, TextSplitterService, WorkerConfig,
    WorkerState,
};
