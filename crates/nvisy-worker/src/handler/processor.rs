//! Processing of a single task attempt.

use std::time::Duration;

use jiff::Timestamp;
use nvisy_embedding::EmbeddingMetadata;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::TRACING_TARGET_PROCESSOR;
use crate::service::{EmbeddingChunkRecord, EmbeddingTask, TaskStatus, TextChunk, WorkerState};

/// Message stored on tasks interrupted by worker shutdown.
pub(crate) const SHUTDOWN_MESSAGE: &str = "worker shutting down";

/// Result of one attempt, as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    /// Every chunk was persisted.
    Completed,
    /// The attempt failed and a retry is due after the delay.
    RetryAfter(Duration),
    /// Retries are exhausted.
    Failed,
    /// Cancelled by a caller or by shutdown.
    Cancelled,
    /// The task was no longer pending when the worker picked it up.
    Skipped,
}

/// Runs one attempt of a task.
#[tracing::instrument(skip(state, shutdown), target = TRACING_TARGET_PROCESSOR)]
pub(crate) async fn process_task(
    state: &WorkerState,
    task_id: Uuid,
    shutdown: &CancellationToken,
) -> TaskOutcome {
    let Some(task) = state.tasks.begin_attempt(task_id).await else {
        tracing::debug!(
            target: TRACING_TARGET_PROCESSOR,
            "Task no longer pending, skipping"
        );
        return TaskOutcome::Skipped;
    };

    tracing::info!(
        target: TRACING_TARGET_PROCESSOR,
        document_id = %task.document_id,
        retry_count = task.retry_count,
        "Processing embedding task"
    );

    let chunks = match state.splitter.split(&task.content) {
        Ok(chunks) if !chunks.is_empty() => chunks,
        Ok(_) => return fail_attempt(state, &task, "document produced no chunks".into()).await,
        Err(error) => return fail_attempt(state, &task, error.to_string()).await,
    };

    let total = chunks.len();
    state
        .tasks
        .update(task_id, |t| t.total_chunks = total)
        .await;

    let started_at = Instant::now();
    let mut processed = 0usize;
    let mut failed = 0usize;

    for batch in chunks.chunks(state.config.batch_size) {
        if shutdown.is_cancelled() {
            state.tasks.cancel(task_id, Some(SHUTDOWN_MESSAGE)).await;
            tracing::info!(target: TRACING_TARGET_PROCESSOR, "Task interrupted by shutdown");
            notify_completion(state, task_id).await;
            return TaskOutcome::Cancelled;
        }
        if state.tasks.status(task_id).await != Some(TaskStatus::Processing) {
            tracing::info!(target: TRACING_TARGET_PROCESSOR, "Task cancelled between batches");
            return TaskOutcome::Cancelled;
        }

        failed += embed_batch(state, &task, batch).await;
        processed += batch.len();

        let elapsed = started_at.elapsed();
        let eta_secs = estimate_eta(elapsed, processed, total);
        let progress_pct = ((processed * 100) / total) as u8;

        let progress = state
            .tasks
            .update(task_id, |t| {
                t.processed_chunks = processed;
                t.failed_chunks = failed;
                t.progress_pct = progress_pct;
                t.eta_secs = eta_secs;
                t.progress()
            })
            .await;

        if let Some(progress) = progress
            && let Err(error) = state.notifier.push_progress(task_id, progress).await
        {
            tracing::warn!(
                target: TRACING_TARGET_PROCESSOR,
                error = %error,
                "Failed to push progress"
            );
        }
    }

    if failed > 0 {
        let message = format!("{failed} of {total} chunks failed to embed");
        return fail_attempt(state, &task, message).await;
    }

    let completed = state
        .tasks
        .update(task_id, |t| {
            if t.status != TaskStatus::Processing {
                return false;
            }
            t.status = TaskStatus::Completed;
            t.progress_pct = 100;
            t.eta_secs = None;
            t.error_message = None;
            t.completed_at = Some(Timestamp::now());
            true
        })
        .await
        .unwrap_or(false);

    if !completed {
        return TaskOutcome::Cancelled;
    }

    tracing::info!(
        target: TRACING_TARGET_PROCESSOR,
        total_chunks = total,
        elapsed_ms = started_at.elapsed().as_millis(),
        "Embedding task completed"
    );
    notify_completion(state, task_id).await;
    TaskOutcome::Completed
}

/// Embeds and persists one batch. Returns the number of chunks that failed.
async fn embed_batch(state: &WorkerState, task: &EmbeddingTask, batch: &[TextChunk]) -> usize {
    let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
    let first_index = batch.first().map(|c| c.index).unwrap_or_default();

    let output = match state
        .embedding
        .generate_embeddings(&texts, task.user_id, None, None)
        .await
    {
        Ok(output) => output,
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_PROCESSOR,
                task_id = %task.id,
                first_chunk = first_index,
                batch_len = batch.len(),
                error = %error,
                "Skipping batch"
            );
            return batch.len();
        }
    };

    let (vectors, metadata) = output.into_parts();
    let tokenizer = state.embedding.tokenizer();
    let mut failed = 0;

    for (chunk, vector) in batch.iter().zip(vectors) {
        let record = EmbeddingChunkRecord {
            id: Uuid::now_v7(),
            task_id: task.id,
            document_id: task.document_id,
            knowledge_base_id: task.knowledge_base_id,
            attempt: task.retry_count,
            chunk_index: chunk.index,
            content: chunk.content.clone(),
            vector,
            token_count: tokenizer.count_tokens(&chunk.content),
            metadata: chunk_metadata(task, chunk, &metadata),
        };

        if let Err(error) = state.vector_store.insert(record).await {
            tracing::warn!(
                target: TRACING_TARGET_PROCESSOR,
                task_id = %task.id,
                chunk_index = chunk.index,
                error = %error,
                "Failed to persist chunk"
            );
            failed += 1;
        }
    }

    failed
}

fn chunk_metadata(task: &EmbeddingTask, chunk: &TextChunk, metadata: &EmbeddingMetadata) -> serde_json::Value {
    json!({
        "offset": chunk.offset,
        "attempt": task.retry_count,
        "provider": metadata.provider,
        "model": metadata.model,
        "dimensions": metadata.dimensions,
        "fallback_reason": metadata.fallback_reason,
        "document": task.metadata,
    })
}

/// Extrapolates the remaining time from the average time per chunk.
fn estimate_eta(elapsed: Duration, processed: usize, total: usize) -> Option<u64> {
    if processed == 0 {
        return None;
    }
    let per_chunk = elapsed.as_secs_f64() / processed as f64;
    let remaining = total.saturating_sub(processed) as f64;
    Some((per_chunk * remaining).ceil() as u64)
}

/// Records a failed attempt and decides between retry and terminal failure.
async fn fail_attempt(state: &WorkerState, task: &EmbeddingTask, message: String) -> TaskOutcome {
    let retry_limit = state.config.retry_limit;

    let outcome = state
        .tasks
        .update(task.id, |t| {
            if t.status != TaskStatus::Processing {
                return TaskOutcome::Cancelled;
            }
            t.error_message = Some(message.clone());
            t.eta_secs = None;
            if t.retry_count < retry_limit {
                let delay = state.config.retry_delay(t.retry_count);
                t.retry_count += 1;
                t.status = TaskStatus::Pending;
                TaskOutcome::RetryAfter(delay)
            } else {
                t.status = TaskStatus::Failed;
                t.completed_at = Some(Timestamp::now());
                TaskOutcome::Failed
            }
        })
        .await
        .unwrap_or(TaskOutcome::Skipped);

    match &outcome {
        TaskOutcome::RetryAfter(delay) => {
            tracing::warn!(
                target: TRACING_TARGET_PROCESSOR,
                task_id = %task.id,
                error = %message,
                retry_in_secs = delay.as_secs(),
                "Task attempt failed, retry scheduled"
            );
        }
        TaskOutcome::Failed => {
            tracing::error!(
                target: TRACING_TARGET_PROCESSOR,
                task_id = %task.id,
                error = %message,
                retry_limit,
                "Task failed, retries exhausted"
            );
            notify_completion(state, task.id).await;
        }
        _ => {}
    }

    outcome
}

async fn notify_completion(state: &WorkerState, task_id: Uuid) {
    let Some(task) = state.tasks.get(task_id).await else {
        return;
    };
    if let Err(error) = state.notifier.push_completion(task_id, task.progress()).await {
        tracing::warn!(
            target: TRACING_TARGET_PROCESSOR,
            task_id = %task_id,
            error = %error,
            "Failed to push completion"
        );
    }
}
