//! Worker behavior with in-memory collaborators.
//!
//! No provider keys are configured, so every batch is served by the local
//! embedder and no network is involved.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nvisy_core::crypto::{EncryptionKey, XChaCha20Cipher};
use nvisy_embedding::credentials::InMemoryKeyStore;
use nvisy_embedding::{EmbeddingConfig, EmbeddingService};
use nvisy_worker::service::{
    BroadcastNotifier, InMemoryVectorStore, QueueStats, TaskEventKind, VectorStore,
};
use nvisy_worker::{
    EmbeddingChunkRecord, EmbeddingTaskService, NewEmbeddingTask, TaskPriority, TaskStatus,
    WorkerConfig, WorkerState,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn embedding_service() -> EmbeddingService {
    let cipher = Arc::new(XChaCha20Cipher::new(EncryptionKey::generate()));
    EmbeddingService::builder(
        EmbeddingConfig::default(),
        Arc::new(InMemoryKeyStore::new()),
        cipher,
    )
    .build()
    .unwrap()
}

fn task_service(
    config: WorkerConfig,
    vector_store: Arc<dyn VectorStore>,
    notifier: Arc<BroadcastNotifier>,
) -> EmbeddingTaskService {
    let state = WorkerState::new(config, embedding_service(), vector_store, notifier).unwrap();
    EmbeddingTaskService::new(state)
}

fn document(content: impl Into<String>) -> NewEmbeddingTask {
    NewEmbeddingTask::new(Uuid::new_v4(), Uuid::new_v4(), content, Uuid::new_v4())
}

async fn wait_for_terminal(service: &EmbeddingTaskService, task_id: Uuid) -> TaskStatus {
    for _ in 0..10_000 {
        if let Some(task) = service.get_task_status(task_id).await
            && task.status.is_terminal()
        {
            return task.status;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("task {task_id} did not finish");
}

/// Records every insert and optionally fails or stalls.
#[derive(Default)]
struct RecordingStore {
    inserts: Mutex<Vec<(Instant, EmbeddingChunkRecord)>>,
    fail: bool,
    fail_once_at: Option<usize>,
    failed_once: AtomicBool,
    delay: Option<Duration>,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn insert(&self, record: EmbeddingChunkRecord) -> nvisy_core::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let chunk_index = record.chunk_index;
        self.inserts.lock().await.push((Instant::now(), record));
        let fail_once = self.fail_once_at == Some(chunk_index)
            && !self.failed_once.swap(true, Ordering::SeqCst);
        if self.fail || fail_once {
            return Err(nvisy_core::Error::external_error().with_message("disk full"));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_task_completes_with_ordered_chunks() {
    let store = Arc::new(InMemoryVectorStore::new());
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();
    let service = task_service(
        WorkerConfig::default().with_batch_size(4),
        store.clone(),
        notifier,
    );

    let request = document("lorem ipsum dolor sit amet ".repeat(400));
    let document_id = request.document_id;
    let task_id = service.queue_embedding_task(request).await.unwrap();
    assert_eq!(
        service.get_task_status(task_id).await.unwrap().status,
        TaskStatus::Pending
    );

    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Completed);
    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.progress_pct, 100);
    assert_eq!(task.processed_chunks, task.total_chunks);
    assert!(task.completed_at.is_some());
    assert!(task.error_message.is_none());

    let records = store.records_for(document_id).await;
    assert_eq!(records.len(), task.total_chunks);
    assert!(records.iter().enumerate().all(|(i, r)| r.chunk_index == i));
    assert!(records.iter().all(|r| r.vector.len() == 384));
    assert_eq!(records[0].metadata["provider"], "local");
    assert_eq!(records[0].metadata["fallback_reason"], "all_providers_failed");

    let mut progress_events = 0;
    let mut completion = None;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            TaskEventKind::Progress => progress_events += 1,
            TaskEventKind::Completion => completion = Some(event.progress),
        }
    }
    assert_eq!(progress_events, task.total_chunks.div_ceil(4));
    assert_eq!(completion.unwrap().status, TaskStatus::Completed);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_long_document_is_split_into_overlapping_chunks() {
    let store = Arc::new(InMemoryVectorStore::new());
    let service = task_service(
        WorkerConfig::default(),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let request = document("x".repeat(12_000));
    let document_id = request.document_id;
    let task_id = service.queue_embedding_task(request).await.unwrap();

    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Completed);
    assert_eq!(service.get_task_status(task_id).await.unwrap().total_chunks, 15);
    assert_eq!(store.records_for(document_id).await.len(), 15);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_whitespace_tail_is_not_embedded() {
    let store = Arc::new(InMemoryVectorStore::new());
    let service = task_service(
        WorkerConfig::default(),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let request = document(format!("{}{}", "a".repeat(900), " ".repeat(1000)));
    let document_id = request.document_id;
    let task_id = service.queue_embedding_task(request).await.unwrap();

    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Completed);
    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.total_chunks, 2);
    assert_eq!(task.processed_chunks, 2);

    let records = store.records_for(document_id).await;
    let indices: Vec<usize> = records.iter().map(|r| r.chunk_index).collect();
    assert_eq!(indices, vec![0, 1]);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retry_pass_is_tagged_on_stored_chunks() {
    let store = Arc::new(RecordingStore {
        fail_once_at: Some(1),
        ..RecordingStore::default()
    });
    let service = task_service(
        WorkerConfig::default(),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let task_id = service
        .queue_embedding_task(document("y".repeat(2500)))
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Completed);
    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.total_chunks, 3);

    let inserts = store.inserts.lock().await;
    let rows: Vec<(u32, usize)> = inserts
        .iter()
        .map(|(_, r)| (r.attempt, r.chunk_index))
        .collect();
    assert_eq!(rows, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
    assert_eq!(inserts[4].1.metadata["attempt"], 1);
    drop(inserts);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempts_back_off_then_fail() {
    let store = Arc::new(RecordingStore {
        fail: true,
        ..RecordingStore::default()
    });
    let service = task_service(
        WorkerConfig::default(),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let task_id = service
        .queue_embedding_task(document("a short document"))
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Failed);
    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.retry_count, 3);
    assert_eq!(task.error_message.as_deref(), Some("1 of 1 chunks failed to embed"));

    let inserts = store.inserts.lock().await;
    assert_eq!(inserts.len(), 4);
    let gaps: Vec<u64> = inserts
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0).as_secs())
        .collect();
    assert_eq!(gaps, vec![60, 120, 240]);
    drop(inserts);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_pending_and_finished_tasks() {
    let store = Arc::new(InMemoryVectorStore::new());
    let service = task_service(
        WorkerConfig::default(),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );

    let pending = service.queue_embedding_task(document("first")).await.unwrap();
    let done = service.queue_embedding_task(document("second")).await.unwrap();

    assert!(service.cancel_task(pending).await);
    assert!(!service.cancel_task(pending).await);
    assert!(!service.cancel_task(Uuid::new_v4()).await);

    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());
    assert_eq!(wait_for_terminal(&service, done).await, TaskStatus::Completed);
    assert!(!service.cancel_task(done).await);

    let cancelled = service.get_task_status(pending).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(store.len().await, 1);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_task_stops_between_batches() {
    let store = Arc::new(RecordingStore {
        delay: Some(Duration::from_secs(1)),
        ..RecordingStore::default()
    });
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();
    let service = task_service(
        WorkerConfig::default()
            .with_batch_size(1)
            .with_chunking(100, 0),
        store.clone(),
        notifier,
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let task_id = service
        .queue_embedding_task(document("y".repeat(1_000)))
        .await
        .unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.kind, TaskEventKind::Progress);
    assert_eq!(first.progress.processed_chunks, 1);
    assert!(first.progress.eta_secs.is_some());

    assert!(service.cancel_task(task_id).await);
    assert_eq!(wait_for_terminal(&service, task_id).await, TaskStatus::Cancelled);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(store.inserts.lock().await.len() < 10);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_higher_priority_runs_first() {
    let store = Arc::new(RecordingStore::default());
    let service = task_service(
        WorkerConfig::default().with_max_concurrent_tasks(1),
        store.clone(),
        Arc::new(BroadcastNotifier::default()),
    );

    let mut expected = Vec::new();
    let mut last = Uuid::nil();
    for priority in [
        TaskPriority::Low,
        TaskPriority::Normal,
        TaskPriority::Urgent,
        TaskPriority::High,
    ] {
        let request = document(format!("{priority} document")).with_priority(priority);
        expected.push((priority, request.document_id));
        last = service.queue_embedding_task(request).await.unwrap();
    }
    expected.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));

    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());
    wait_for_terminal(&service, last).await;
    for _ in 0..100 {
        if store.inserts.lock().await.len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let order: Vec<Uuid> = store
        .inserts
        .lock()
        .await
        .iter()
        .map(|(_, record)| record.document_id)
        .collect();
    let expected: Vec<Uuid> = expected.into_iter().map(|(_, id)| id).collect();
    assert_eq!(order, expected);

    token.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_task() {
    let store = Arc::new(RecordingStore {
        delay: Some(Duration::from_secs(1)),
        ..RecordingStore::default()
    });
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();
    let service = task_service(
        WorkerConfig::default()
            .with_batch_size(1)
            .with_chunking(100, 0),
        store.clone(),
        notifier,
    );
    let token = CancellationToken::new();
    let worker = service.spawn_worker(token.clone());

    let task_id = service
        .queue_embedding_task(document("z".repeat(1_000)))
        .await
        .unwrap();
    events.recv().await.unwrap();

    token.cancel();
    worker.await.unwrap().unwrap();

    let task = service.get_task_status(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.error_message.as_deref(), Some("worker shutting down"));
}

#[tokio::test(start_paused = true)]
async fn test_rejects_blank_document() {
    let service = task_service(
        WorkerConfig::default(),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(BroadcastNotifier::default()),
    );
    let err = service.queue_embedding_task(document("   ")).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(service.queue_stats().await, QueueStats::default());
}

#[tokio::test(start_paused = true)]
async fn test_list_tasks_and_queue_stats() {
    let service = task_service(
        WorkerConfig::default(),
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(BroadcastNotifier::default()),
    );

    let first = service.queue_embedding_task(document("one")).await.unwrap();
    let second = service.queue_embedding_task(document("two")).await.unwrap();
    service.queue_embedding_task(document("three")).await.unwrap();
    service.cancel_task(second).await;

    let stats = service.queue_stats().await;
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.queue_depth, 2);

    let all = service.list_tasks(None).await;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, first);

    let cancelled = service.list_tasks(Some(TaskStatus::Cancelled)).await;
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, second);

    let progress = service.get_task_progress(first).await.unwrap();
    assert_eq!(progress.status, TaskStatus::Pending);
    assert_eq!(progress.progress_pct, 0);
}
