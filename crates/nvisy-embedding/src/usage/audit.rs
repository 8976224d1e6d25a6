//! Fire-and-forget audit of embedding operations.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use nvisy_core::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::TRACING_TARGET_AUDIT;
use crate::provider::ProviderId;
use crate::service::FallbackReason;

/// One embedding operation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEvent {
    /// Requesting user.
    pub user_id: Uuid,
    /// Provider that served (or failed) the call.
    pub provider: ProviderId,
    /// Model name.
    pub model: String,
    /// Number of texts.
    pub text_count: usize,
    /// Number of tokens.
    pub token_count: u64,
    /// Whether the provider call succeeded.
    pub success: bool,
    /// Wall time of the provider call.
    pub latency_ms: u64,
    /// Error message of a failed call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the local fallback served the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    /// When the operation finished.
    pub occurred_at: Timestamp,
}

/// Sink for [`EmbeddingEvent`]s.
///
/// Failures are logged by the caller and never abort the operation.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    /// Records one embedding operation.
    async fn log_embedding_operation(&self, event: EmbeddingEvent) -> Result<()>;
}

/// [`AuditLogger`] that emits a structured tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log_embedding_operation(&self, event: EmbeddingEvent) -> Result<()> {
        tracing::info!(
            target: TRACING_TARGET_AUDIT,
            user_id = %event.user_id,
            provider = %event.provider,
            model = %event.model,
            text_count = event.text_count,
            token_count = event.token_count,
            success = event.success,
            latency_ms = event.latency_ms,
            error = event.error.as_deref(),
            fallback_reason = event.fallback_reason.as_ref().map(AsRef::<str>::as_ref),
            "Embedding operation"
        );
        Ok(())
    }
}

/// [`AuditLogger`] that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLogger {
    events: Arc<Mutex<Vec<EmbeddingEvent>>>,
}

impl InMemoryAuditLogger {
    /// Creates an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    pub async fn events(&self) -> Vec<EmbeddingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLogger {
    async fn log_embedding_operation(&self, event: EmbeddingEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
