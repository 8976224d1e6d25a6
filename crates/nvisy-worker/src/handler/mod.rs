//! Background task processing.
//!
//! [`TaskWorker`] drains the priority queue with at most
//! `max_concurrent_tasks` tasks in flight. Failed attempts are parked in a
//! delay queue and pushed back onto the priority queue once their backoff
//! expires, so no worker ever sleeps through a backoff.

mod processor;

use std::sync::Arc;

use futures::StreamExt;
use jiff::Timestamp;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use uuid::Uuid;

use self::processor::{TaskOutcome, process_task};
use crate::error::Result;
use crate::service::{TaskStatus, WorkerState};
use crate::TRACING_TARGET_DISPATCHER;

/// What woke the dispatcher.
enum DispatchEvent {
    Shutdown,
    Finished(std::result::Result<(Uuid, TaskOutcome), JoinError>),
    RetryDue(Uuid),
    Maintenance,
    Dispatch(OwnedSemaphorePermit, Uuid),
}

/// Background worker for document embedding tasks.
pub struct TaskWorker {
    state: WorkerState,
    cancel_token: CancellationToken,
    semaphore: Arc<Semaphore>,
}

impl TaskWorker {
    /// Creates a new task worker.
    ///
    /// # Arguments
    ///
    /// * `state` - Shared worker state with the queue, task store and services
    /// * `cancel_token` - Token for graceful shutdown signaling
    pub fn new(state: WorkerState, cancel_token: CancellationToken) -> Self {
        let semaphore = state.create_semaphore();
        Self {
            state,
            cancel_token,
            semaphore,
        }
    }

    /// Spawns the worker as a background task.
    ///
    /// Returns a join handle that can be used to await worker completion
    /// after cancelling the token.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs the dispatch loop until the cancel token fires.
    #[tracing::instrument(
        skip(self),
        fields(max_concurrent = self.state.config.max_concurrent_tasks),
        target = TRACING_TARGET_DISPATCHER,
        name = "task_worker"
    )]
    async fn run(self) -> Result<()> {
        tracing::info!(target: TRACING_TARGET_DISPATCHER, "Starting task worker");

        let mut in_flight: JoinSet<(Uuid, TaskOutcome)> = JoinSet::new();
        let mut retries: DelayQueue<Uuid> = DelayQueue::new();
        let mut maintenance = tokio::time::interval(self.state.config.maintenance_interval());
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => DispatchEvent::Shutdown,

                Some(joined) = in_flight.join_next() => DispatchEvent::Finished(joined),

                Some(expired) = retries.next(), if !retries.is_empty() => {
                    DispatchEvent::RetryDue(expired.into_inner())
                }

                _ = maintenance.tick() => DispatchEvent::Maintenance,

                (permit, task_id) = next_task(&self.state, self.semaphore.clone()) => {
                    DispatchEvent::Dispatch(permit, task_id)
                }
            };

            match event {
                DispatchEvent::Shutdown => {
                    tracing::info!(
                        target: TRACING_TARGET_DISPATCHER,
                        in_flight = in_flight.len(),
                        pending_retries = retries.len(),
                        "Shutdown requested, stopping task worker"
                    );
                    break;
                }
                DispatchEvent::Finished(joined) => self.on_finished(joined, &mut retries),
                DispatchEvent::RetryDue(task_id) => self.on_retry_due(task_id).await,
                DispatchEvent::Maintenance => self.maintain().await,
                DispatchEvent::Dispatch(permit, task_id) => {
                    let state = self.state.clone();
                    let shutdown = self.cancel_token.clone();
                    in_flight.spawn(async move {
                        // Hold permit until the attempt completes
                        let _permit = permit;
                        let outcome = process_task(&state, task_id, &shutdown).await;
                        (task_id, outcome)
                    });
                }
            }
        }

        // Running tasks observe the token between batches.
        while let Some(joined) = in_flight.join_next().await {
            self.on_finished(joined, &mut retries);
        }

        tracing::info!(target: TRACING_TARGET_DISPATCHER, "Task worker stopped");
        Ok(())
    }

    fn on_finished(
        &self,
        joined: std::result::Result<(Uuid, TaskOutcome), JoinError>,
        retries: &mut DelayQueue<Uuid>,
    ) {
        match joined {
            Ok((task_id, TaskOutcome::RetryAfter(delay))) => {
                if self.cancel_token.is_cancelled() {
                    tracing::info!(
                        target: TRACING_TARGET_DISPATCHER,
                        task_id = %task_id,
                        "Retry not scheduled, worker is stopping"
                    );
                    return;
                }
                retries.insert(task_id, delay);
            }
            Ok((task_id, outcome)) => {
                tracing::debug!(
                    target: TRACING_TARGET_DISPATCHER,
                    task_id = %task_id,
                    outcome = ?outcome,
                    "Task attempt finished"
                );
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_DISPATCHER,
                    error = %error,
                    "Task attempt panicked"
                );
            }
        }
    }

    async fn on_retry_due(&self, task_id: Uuid) {
        let Some(task) = self.state.tasks.get(task_id).await else {
            return;
        };
        if task.status != TaskStatus::Pending {
            tracing::debug!(
                target: TRACING_TARGET_DISPATCHER,
                task_id = %task_id,
                status = %task.status,
                "Dropping retry of task that is no longer pending"
            );
            return;
        }

        tracing::info!(
            target: TRACING_TARGET_DISPATCHER,
            task_id = %task_id,
            retry_count = task.retry_count,
            "Re-queuing task after backoff"
        );
        self.state.queue.push(task_id, task.priority).await;
    }

    async fn maintain(&self) {
        let evicted = self
            .state
            .tasks
            .evict_expired(Timestamp::now(), self.state.config.task_ttl())
            .await;
        let purged = self.state.embedding.purge_expired().await;

        if evicted > 0 {
            tracing::debug!(
                target: TRACING_TARGET_DISPATCHER,
                evicted,
                cached_keys = purged.cached_keys,
                rate_limit_windows = purged.rate_limit_windows,
                "Evicted expired tasks"
            );
        }
    }
}

/// Waits for a free slot, then for a queued task.
async fn next_task(state: &WorkerState, semaphore: Arc<Semaphore>) -> (OwnedSemaphorePermit, Uuid) {
    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        // The semaphore is never closed.
        Err(_) => std::future::pending().await,
    };
    let task_id = state.queue.pop_wait().await;
    (permit, task_id)
}
