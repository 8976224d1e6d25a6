//! Best-effort progress notifications.

use async_trait::async_trait;
use nvisy_core::Result;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::TaskProgress;

/// Receives progress of running tasks.
///
/// Delivery is best-effort; errors are logged and otherwise ignored.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    /// Called after every batch.
    async fn push_progress(&self, task_id: Uuid, progress: TaskProgress) -> Result<()>;

    /// Called once a task reaches a terminal state.
    async fn push_completion(&self, task_id: Uuid, progress: TaskProgress) -> Result<()>;
}

/// Kind of a [`TaskEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskEventKind {
    /// A batch finished.
    Progress,
    /// The task reached a terminal state.
    Completion,
}

/// Notification broadcast by [`BroadcastNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Event kind.
    pub kind: TaskEventKind,
    /// Task identifier.
    pub task_id: Uuid,
    /// Progress at the time of the event.
    pub progress: TaskProgress,
}

/// [`ProgressNotifier`] backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<TaskEvent>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    fn send(&self, kind: TaskEventKind, task_id: Uuid, progress: TaskProgress) {
        // No subscribers is not an error.
        let _ = self.sender.send(TaskEvent {
            kind,
            task_id,
            progress,
        });
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressNotifier for BroadcastNotifier {
    async fn push_progress(&self, task_id: Uuid, progress: TaskProgress) -> Result<()> {
        self.send(TaskEventKind::Progress, task_id, progress);
        Ok(())
    }

    async fn push_completion(&self, task_id: Uuid, progress: TaskProgress) -> Result<()> {
        self.send(TaskEventKind::Completion, task_id, progress);
        Ok(())
    }
}
