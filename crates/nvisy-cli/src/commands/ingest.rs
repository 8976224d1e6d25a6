//! `nvisy ingest`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use nvisy_embedding::EmbeddingService;
use nvisy_worker::service::{BroadcastNotifier, InMemoryVectorStore, TaskEventKind};
use nvisy_worker::{
    EmbeddingTaskService, NewEmbeddingTask, TaskPriority, TaskStatus, WorkerConfig, WorkerState,
};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::print_json;
use crate::TRACING_TARGET_INGEST;
use crate::signal::shutdown_signal;

/// Arguments of `nvisy ingest`.
#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// UTF-8 text file to ingest.
    pub file: PathBuf,

    /// Queue priority of the task.
    #[arg(long, value_enum, default_value_t = TaskPriority::Normal)]
    pub priority: TaskPriority,

    /// User the task is attributed to. Random if omitted.
    #[arg(long)]
    pub user: Option<Uuid>,

    /// Knowledge base the document belongs to. Random if omitted.
    #[arg(long)]
    pub knowledge_base: Option<Uuid>,
}

pub(super) async fn run(
    args: IngestArgs,
    config: WorkerConfig,
    embedding: EmbeddingService,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let vector_store = Arc::new(InMemoryVectorStore::new());
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();

    let state = WorkerState::new(config, embedding, vector_store.clone(), notifier)
        .context("failed to create worker state")?;
    let service = EmbeddingTaskService::new(state);

    let shutdown = CancellationToken::new();
    let worker = service.spawn_worker(shutdown.clone());

    let document_id = Uuid::new_v4();
    let request = NewEmbeddingTask::new(
        document_id,
        args.knowledge_base.unwrap_or_else(Uuid::new_v4),
        content,
        args.user.unwrap_or_else(Uuid::new_v4),
    )
    .with_priority(args.priority)
    .with_metadata(json!({ "path": args.file.display().to_string() }));
    let task_id = service.queue_embedding_task(request).await?;

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            () = &mut signal => break,
            event = events.recv() => match event {
                Ok(event) if event.task_id != task_id => {}
                Ok(event) if event.kind == TaskEventKind::Completion => break,
                Ok(event) => {
                    tracing::info!(
                        target: TRACING_TARGET_INGEST,
                        processed = event.progress.processed_chunks,
                        total = event.progress.total_chunks,
                        progress_pct = event.progress.progress_pct,
                        eta_secs = ?event.progress.eta_secs,
                        "Ingest progress"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: TRACING_TARGET_INGEST, skipped, "Progress events skipped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    shutdown.cancel();
    worker
        .await
        .context("task worker panicked")?
        .context("task worker failed")?;

    let task = service
        .get_task_status(task_id)
        .await
        .context("task record missing")?;
    let records = vector_store.records_for(document_id).await;

    print_json(&json!({
        "task_id": task.id,
        "document_id": document_id,
        "status": task.status,
        "total_chunks": task.total_chunks,
        "stored_chunks": records.len(),
        "retry_count": task.retry_count,
        "error": task.error_message,
        "providers": records
            .iter()
            .filter_map(|r| r.metadata["provider"].as_str())
            .collect::<std::collections::BTreeSet<_>>(),
    }))?;

    match task.status {
        TaskStatus::Completed => Ok(()),
        status => Err(anyhow::anyhow!("ingest ended with status {status}")),
    }
}
