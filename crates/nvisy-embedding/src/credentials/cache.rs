//! Time-bounded cache of resolved keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::ResolvedKey;
use crate::provider::ProviderId;

type CacheKey = (Uuid, ProviderId);

#[derive(Debug, Clone)]
struct CacheEntry {
    key: ResolvedKey,
    expires_at: Instant,
}

/// Cache of resolved keys keyed by (user, provider).
#[derive(Debug, Clone)]
pub struct KeyCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
}

impl KeyCache {
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a live entry.
    pub async fn get(&self, user_id: Uuid, provider: ProviderId) -> Option<ResolvedKey> {
        let entries = self.entries.read().await;
        entries
            .get(&(user_id, provider))
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.key.clone())
    }

    /// Stores an entry, replacing any previous one.
    pub async fn insert(&self, user_id: Uuid, provider: ProviderId, key: ResolvedKey) {
        let entry = CacheEntry {
            key,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert((user_id, provider), entry);
    }

    /// Drops the entry for (user, provider). Returns true if one existed.
    pub async fn invalidate(&self, user_id: Uuid, provider: ProviderId) -> bool {
        self.entries
            .write()
            .await
            .remove(&(user_id, provider))
            .is_some()
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ApiKey, KeySource};

    fn resolved() -> ResolvedKey {
        ResolvedKey::new(ApiKey::new("sk-test"), KeySource::System, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = KeyCache::new(Duration::from_secs(300));
        let user = Uuid::new_v4();
        cache.insert(user, ProviderId::OpenAi, resolved()).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(user, ProviderId::OpenAi).await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(user, ProviderId::OpenAi).await.is_none());
        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = KeyCache::new(Duration::from_secs(300));
        let user = Uuid::new_v4();
        cache.insert(user, ProviderId::OpenAi, resolved()).await;
        assert!(cache.invalidate(user, ProviderId::OpenAi).await);
        assert!(!cache.invalidate(user, ProviderId::OpenAi).await);
        assert!(cache.get(user, ProviderId::OpenAi).await.is_none());
    }
}
