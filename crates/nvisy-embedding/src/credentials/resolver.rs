//! Key resolution with cache, user, system and pooled sources.

use std::collections::HashMap;
use std::sync::Arc;

use nvisy_core::crypto::KeyCipher;
use uuid::Uuid;

use super::{ApiKey, ApiKeyRecord, KeyCache, KeySource, KeyStore, ResolvedKey};
use crate::TRACING_TARGET_CREDENTIALS;
use crate::provider::ProviderId;

/// Resolves the usable API key for a (user, provider) pair.
///
/// Resolution never fails: store errors and undecryptable keys are logged and
/// treated as a missing key so that the caller can move on.
#[derive(Clone)]
pub struct ApiKeyResolver {
    store: Arc<dyn KeyStore>,
    cipher: Arc<dyn KeyCipher>,
    cache: KeyCache,
    system_keys: Arc<HashMap<ProviderId, ApiKey>>,
}

impl std::fmt::Debug for ApiKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyResolver")
            .field("cache", &self.cache)
            .field("system_keys", &self.system_keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ApiKeyResolver {
    /// Creates a resolver.
    pub fn new(
        store: Arc<dyn KeyStore>,
        cipher: Arc<dyn KeyCipher>,
        cache: KeyCache,
        system_keys: HashMap<ProviderId, ApiKey>,
    ) -> Self {
        let system_keys = system_keys
            .into_iter()
            .filter(|(_, key)| !key.is_blank())
            .collect();

        Self {
            store,
            cipher,
            cache,
            system_keys: Arc::new(system_keys),
        }
    }

    /// Returns the key cache.
    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Returns the active key for the user and provider, if any.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CREDENTIALS)]
    pub async fn get_active_key(&self, user_id: Uuid, provider: ProviderId) -> Option<ResolvedKey> {
        if !provider.requires_api_key() {
            return None;
        }

        if let Some(cached) = self.cache.get(user_id, provider).await {
            tracing::trace!(target: TRACING_TARGET_CREDENTIALS, source = %cached.source, "Key cache hit");
            return Some(cached);
        }

        let resolved = match self.user_key(user_id, provider).await {
            Some(key) => Some(key),
            None => match self.system_key(provider) {
                Some(key) => Some(key),
                None => self.pooled_key(provider).await,
            },
        }?;

        tracing::debug!(
            target: TRACING_TARGET_CREDENTIALS,
            source = %resolved.source,
            "Resolved provider key"
        );

        self.cache.insert(user_id, provider, resolved.clone()).await;
        Some(resolved)
    }

    /// Drops the cached key for the user and provider.
    pub async fn invalidate(&self, user_id: Uuid, provider: ProviderId) {
        if self.cache.invalidate(user_id, provider).await {
            tracing::info!(
                target: TRACING_TARGET_CREDENTIALS,
                user_id = %user_id,
                provider = %provider,
                "Invalidated cached key"
            );
        }
    }

    /// Records a successful use of a stored key.
    pub async fn mark_used(&self, key: &ResolvedKey) {
        let Some(record_id) = key.record_id else {
            return;
        };

        if let Err(error) = self.store.record_usage(record_id).await {
            tracing::warn!(
                target: TRACING_TARGET_CREDENTIALS,
                key_id = %record_id,
                error = %error,
                "Failed to record key usage"
            );
        }
    }

    async fn user_key(&self, user_id: Uuid, provider: ProviderId) -> Option<ResolvedKey> {
        match self.store.current_user_key(user_id, provider).await {
            Ok(Some(record)) => self.decrypt(&record, KeySource::User),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_CREDENTIALS,
                    provider = %provider,
                    error = %error,
                    "Failed to load user key"
                );
                None
            }
        }
    }

    fn system_key(&self, provider: ProviderId) -> Option<ResolvedKey> {
        self.system_keys
            .get(&provider)
            .map(|key| ResolvedKey::new(key.clone(), KeySource::System, None))
    }

    async fn pooled_key(&self, provider: ProviderId) -> Option<ResolvedKey> {
        let pooled = match self.store.pooled_keys(provider).await {
            Ok(pooled) => pooled,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_CREDENTIALS,
                    provider = %provider,
                    error = %error,
                    "Failed to load pooled keys"
                );
                return None;
            }
        };

        // Least recently used first; never-used keys sort before used ones.
        let record = pooled
            .iter()
            .filter(|r| r.is_active)
            .min_by_key(|r| (r.last_used_at, r.usage_count))?;
        self.decrypt(record, KeySource::Pooled)
    }

    fn decrypt(&self, record: &ApiKeyRecord, source: KeySource) -> Option<ResolvedKey> {
        match self.cipher.decrypt_string(&record.encrypted_key) {
            Ok(plaintext) => Some(ResolvedKey::new(
                ApiKey::new(plaintext),
                source,
                Some(record.id),
            )),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_CREDENTIALS,
                    key_id = %record.id,
                    provider = %record.provider,
                    source = %source,
                    error = %error,
                    "Failed to decrypt stored key"
                );
                None
            }
        }
    }
}
