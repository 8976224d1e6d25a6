//! Persisted API key records.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use nvisy_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provider::ProviderId;

/// A stored, encrypted API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Owning user; `None` for pooled system keys.
    pub user_id: Option<Uuid>,
    /// Provider the key belongs to.
    pub provider: ProviderId,
    /// Ciphertext produced by the configured key cipher.
    pub encrypted_key: Vec<u8>,
    /// Number of provider calls made with this key.
    pub usage_count: u64,
    /// Last time the key was used.
    pub last_used_at: Option<Timestamp>,
    /// Last time the record was written.
    pub updated_at: Timestamp,
    /// Whether the key may be used.
    pub is_active: bool,
    /// Whether the key belongs to the shared system pool.
    pub is_system_pool: bool,
}

impl ApiKeyRecord {
    /// Creates an active user key.
    pub fn user(user_id: Uuid, provider: ProviderId, encrypted_key: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: Some(user_id),
            provider,
            encrypted_key,
            usage_count: 0,
            last_used_at: None,
            updated_at: Timestamp::now(),
            is_active: true,
            is_system_pool: false,
        }
    }

    /// Creates an active pooled system key.
    pub fn pooled(provider: ProviderId, encrypted_key: Vec<u8>) -> Self {
        Self {
            user_id: None,
            is_system_pool: true,
            ..Self::user(Uuid::nil(), provider, encrypted_key)
        }
    }

    /// Marks the record as inactive.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Overrides the last update time.
    pub fn with_updated_at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = updated_at;
        self
    }
}

/// Storage of encrypted API keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Returns the current key of a user for a provider.
    ///
    /// The current key is the most recently updated active record.
    async fn current_user_key(
        &self,
        user_id: Uuid,
        provider: ProviderId,
    ) -> Result<Option<ApiKeyRecord>>;

    /// Returns all active pooled keys for a provider.
    async fn pooled_keys(&self, provider: ProviderId) -> Result<Vec<ApiKeyRecord>>;

    /// Increments `usage_count` and touches `last_used_at`.
    async fn record_usage(&self, key_id: Uuid) -> Result<()>;
}

/// In-memory [`KeyStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyStore {
    records: Arc<RwLock<Vec<ApiKeyRecord>>>,
}

impl InMemoryKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record and returns its id.
    pub async fn insert(&self, record: ApiKeyRecord) -> Uuid {
        let id = record.id;
        self.records.write().await.push(record);
        id
    }

    /// Deactivates a record. Returns false if it does not exist.
    pub async fn deactivate(&self, key_id: Uuid) -> bool {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == key_id) {
            Some(record) => {
                record.is_active = false;
                record.updated_at = Timestamp::now();
                true
            }
            None => false,
        }
    }

    /// Returns a copy of a record.
    pub async fn get(&self, key_id: Uuid) -> Option<ApiKeyRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == key_id)
            .cloned()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn current_user_key(
        &self,
        user_id: Uuid,
        provider: ProviderId,
    ) -> Result<Option<ApiKeyRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| {
                r.is_active
                    && !r.is_system_pool
                    && r.provider == provider
                    && r.user_id == Some(user_id)
            })
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    async fn pooled_keys(&self, provider: ProviderId) -> Result<Vec<ApiKeyRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.is_active && r.is_system_pool && r.provider == provider)
            .cloned()
            .collect())
    }

    async fn record_usage(&self, key_id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == key_id)
            .ok_or_else(|| Error::not_found().with_message(format!("api key {key_id}")))?;
        record.usage_count += 1;
        record.last_used_at = Some(Timestamp::now());
        Ok(())
    }
}
