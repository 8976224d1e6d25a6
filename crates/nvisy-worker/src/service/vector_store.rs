//! Persistence seam for chunk vectors.

use std::sync::Arc;

use async_trait::async_trait;
use nvisy_core::Result;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::EmbeddingChunkRecord;

/// Append-only sink for chunk vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists one chunk record.
    async fn insert(&self, record: EmbeddingChunkRecord) -> Result<()>;
}

/// [`VectorStore`] that keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    records: Arc<RwLock<Vec<EmbeddingChunkRecord>>>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records of a document in insertion order.
    pub async fn records_for(&self, document_id: Uuid) -> Vec<EmbeddingChunkRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, record: EmbeddingChunkRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}
