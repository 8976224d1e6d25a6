//! Fallback orchestration over the configured providers.

mod config;
mod metadata;
mod status;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use config::{
    DEFAULT_KEY_CACHE_TTL_SECS, DEFAULT_RATE_LIMIT_WINDOW_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_USAGE_RETENTION_DAYS, EmbeddingConfig,
};
pub use metadata::{EmbeddingMetadata, EmbeddingOutput, FallbackReason};
use jiff::Timestamp;
use nvisy_core::crypto::KeyCipher;
use nvisy_core::{Error, Result, ServiceHealth};
pub use status::{ProviderState, ProviderStatusBoard, ProviderStatusEntry, ProviderStatusReport};
use strum::IntoEnumIterator;
use tokio::time::Instant;
use uuid::Uuid;

use crate::TRACING_TARGET_SERVICE;
use crate::credentials::{ApiKeyResolver, KeyStore};
use crate::provider::{EmbeddingAdapter, LocalEmbedder, ModelSpec, OpenAiClient, ProviderId};
use crate::state::{EmbeddingState, PurgeReport};
use crate::tokenizer::{ApproximateTokenizer, Tokenizer};
use crate::usage::{AuditLogger, EmbeddingEvent, TracingAuditLogger, UsageSummary};

struct EmbeddingServiceInner {
    config: EmbeddingConfig,
    state: EmbeddingState,
    resolver: ApiKeyResolver,
    openai: OpenAiClient,
    tokenizer: Arc<dyn Tokenizer>,
    audit: Arc<dyn AuditLogger>,
}

/// Generates embeddings through the provider fallback chain.
///
/// Providers are tried in priority order. A provider is skipped when no key
/// resolves, when the rate limiter rejects the batch, or when the call fails.
/// When every provider has been skipped the local embedder produces the
/// vectors and the metadata carries [`FallbackReason::AllProvidersFailed`].
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EmbeddingService`].
pub struct EmbeddingServiceBuilder {
    config: EmbeddingConfig,
    key_store: Arc<dyn KeyStore>,
    cipher: Arc<dyn KeyCipher>,
    state: Option<EmbeddingState>,
    tokenizer: Arc<dyn Tokenizer>,
    audit: Arc<dyn AuditLogger>,
}

impl EmbeddingServiceBuilder {
    /// Uses existing shared state instead of fresh state.
    pub fn with_state(mut self, state: EmbeddingState) -> Self {
        self.state = Some(state);
        self
    }

    /// Replaces the default approximate tokenizer.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Replaces the default tracing audit logger.
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Validates the configuration and builds the service.
    pub fn build(self) -> Result<EmbeddingService> {
        self.config.validate()?;

        let state = self
            .state
            .unwrap_or_else(|| EmbeddingState::from_config(&self.config));
        let openai = OpenAiClient::new(&self.config.openai_base_url, self.config.request_timeout())?;
        let resolver = ApiKeyResolver::new(
            self.key_store,
            self.cipher,
            state.key_cache.clone(),
            self.config.system_keys(),
        );

        tracing::info!(
            target: TRACING_TARGET_SERVICE,
            providers = ?self.config.provider_priority,
            window_secs = self.config.rate_limit_window_secs,
            "Embedding service initialized"
        );

        Ok(EmbeddingService {
            inner: Arc::new(EmbeddingServiceInner {
                config: self.config,
                state,
                resolver,
                openai,
                tokenizer: self.tokenizer,
                audit: self.audit,
            }),
        })
    }
}

/// Outcome of one provider attempt.
enum Attempt {
    Success(EmbeddingOutput),
    Skipped,
}

impl EmbeddingService {
    /// Starts building a service.
    pub fn builder(
        config: EmbeddingConfig,
        key_store: Arc<dyn KeyStore>,
        cipher: Arc<dyn KeyCipher>,
    ) -> EmbeddingServiceBuilder {
        EmbeddingServiceBuilder {
            config,
            key_store,
            cipher,
            state: None,
            tokenizer: Arc::new(ApproximateTokenizer),
            audit: Arc::new(TracingAuditLogger),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EmbeddingConfig {
        &self.inner.config
    }

    /// Returns the shared state.
    pub fn state(&self) -> &EmbeddingState {
        &self.inner.state
    }

    /// Returns the tokenizer.
    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.inner.tokenizer.as_ref()
    }

    fn model_for(&self, provider: ProviderId, preferred: Option<&str>) -> &'static ModelSpec {
        let catalog = provider.config();
        preferred
            .and_then(|name| catalog.model(name))
            .or_else(|| {
                self.inner
                    .config
                    .default_model(provider)
                    .and_then(|name| catalog.model(name))
            })
            .unwrap_or_else(|| catalog.default_model())
    }

    /// Embeds `texts` for `user_id`.
    ///
    /// `preferred_provider` is tried first. `preferred_model` is used by every
    /// provider that offers a model of that name; others use their configured
    /// or catalog default.
    ///
    /// # Errors
    ///
    /// Fails only on invalid input (no texts, or a blank text). Provider
    /// failures are absorbed by the fallback chain.
    #[tracing::instrument(
        skip(self, texts),
        target = TRACING_TARGET_SERVICE,
        fields(text_count = texts.len())
    )]
    pub async fn generate_embeddings(
        &self,
        texts: &[String],
        user_id: Uuid,
        preferred_provider: Option<ProviderId>,
        preferred_model: Option<&str>,
    ) -> Result<EmbeddingOutput> {
        if texts.is_empty() {
            return Err(Error::invalid_input().with_message("no texts to embed"));
        }
        if let Some(index) = texts.iter().position(|text| text.trim().is_empty()) {
            return Err(Error::invalid_input().with_message(format!("text at index {index} is empty")));
        }

        if preferred_provider == Some(ProviderId::Local) {
            let output = self.generate_local(texts, user_id, None, 1).await;
            return Ok(output);
        }

        let chain = self.provider_chain(preferred_provider);
        let estimated_tokens = self.inner.tokenizer.count_all(texts);

        for (index, provider) in chain.iter().copied().enumerate() {
            let model = self.model_for(provider, preferred_model);
            let attempt = self
                .try_provider(provider, model, texts, user_id, estimated_tokens, index + 1)
                .await;
            if let Attempt::Success(output) = attempt {
                return Ok(output);
            }
        }

        tracing::warn!(
            target: TRACING_TARGET_SERVICE,
            user_id = %user_id,
            attempted = chain.len(),
            "All providers failed, using local fallback"
        );

        Ok(self
            .generate_local(
                texts,
                user_id,
                Some(FallbackReason::AllProvidersFailed),
                chain.len() + 1,
            )
            .await)
    }

    /// Network providers in attempt order.
    fn provider_chain(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        let mut chain = Vec::with_capacity(self.inner.config.provider_priority.len() + 1);
        for provider in preferred
            .into_iter()
            .chain(self.inner.config.provider_priority.iter().copied())
        {
            if !provider.is_local() && !chain.contains(&provider) {
                chain.push(provider);
            }
        }
        chain
    }

    async fn try_provider(
        &self,
        provider: ProviderId,
        model: &'static ModelSpec,
        texts: &[String],
        user_id: Uuid,
        estimated_tokens: u64,
        attempts: usize,
    ) -> Attempt {
        let state = &self.inner.state;

        let Some(key) = self.inner.resolver.get_active_key(user_id, provider).await else {
            tracing::debug!(
                target: TRACING_TARGET_SERVICE,
                provider = %provider,
                "No API key, skipping provider"
            );
            state
                .provider_status
                .mark(provider, ProviderState::NoApiKey, None)
                .await;
            return Attempt::Skipped;
        };

        let decision = state
            .rate_limiter
            .check_and_consume(user_id, provider, estimated_tokens)
            .await;
        if !decision.allowed {
            let reason = decision.info.reason.map(|r| r.to_string()).unwrap_or_default();
            tracing::debug!(
                target: TRACING_TARGET_SERVICE,
                provider = %provider,
                reason = %reason,
                reset_in_secs = decision.info.reset_in_secs,
                "Rate limited, skipping provider"
            );
            state
                .provider_status
                .mark(provider, ProviderState::RateLimited, Some(reason))
                .await;
            return Attempt::Skipped;
        }

        let adapter = EmbeddingAdapter::for_provider(provider, &self.inner.openai);
        let started_at = Instant::now();
        let result = adapter.generate(texts, model, Some(&key.key)).await;
        let latency_ms = started_at.elapsed().as_millis() as u64;

        match result {
            Ok(generated) if generated.vectors.len() == texts.len() => {
                let tokens = generated
                    .usage
                    .map(|usage| usage.total)
                    .filter(|total| *total > 0)
                    .unwrap_or(estimated_tokens);
                let cost = provider.config().cost(tokens);

                state.provider_status.mark_available(provider).await;
                self.inner.resolver.mark_used(&key).await;
                state
                    .usage
                    .record(user_id, provider, texts.len() as u64, tokens, cost, false)
                    .await;
                self.audit(EmbeddingEvent {
                    user_id,
                    provider,
                    model: model.name.to_owned(),
                    text_count: texts.len(),
                    token_count: tokens,
                    success: true,
                    latency_ms,
                    error: None,
                    fallback_reason: None,
                    occurred_at: Timestamp::now(),
                });

                tracing::debug!(
                    target: TRACING_TARGET_SERVICE,
                    provider = %provider,
                    model = model.name,
                    tokens,
                    latency_ms,
                    "Generated embeddings"
                );

                Attempt::Success(EmbeddingOutput {
                    vectors: generated.vectors,
                    metadata: EmbeddingMetadata {
                        provider,
                        model: model.name.to_owned(),
                        dimensions: model.dimensions,
                        text_count: texts.len(),
                        tokens,
                        cost,
                        latency_ms,
                        rate_limit: Some(decision.info),
                        fallback_reason: None,
                        stub: adapter.is_stub(),
                        key_source: Some(key.source),
                        attempts,
                    },
                })
            }
            Ok(generated) => {
                let error = Error::external_error().with_message(format!(
                    "expected {} vectors, received {}",
                    texts.len(),
                    generated.vectors.len()
                ));
                self.record_failure(provider, model, texts.len(), user_id, latency_ms, &error)
                    .await;
                Attempt::Skipped
            }
            Err(error) => {
                if error.is_authentication() {
                    self.inner.resolver.invalidate(user_id, provider).await;
                }
                self.record_failure(provider, model, texts.len(), user_id, latency_ms, &error)
                    .await;
                Attempt::Skipped
            }
        }
    }

    async fn record_failure(
        &self,
        provider: ProviderId,
        model: &ModelSpec,
        text_count: usize,
        user_id: Uuid,
        latency_ms: u64,
        error: &Error,
    ) {
        tracing::warn!(
            target: TRACING_TARGET_SERVICE,
            provider = %provider,
            kind = error.kind_str(),
            error = %error,
            "Provider call failed"
        );

        self.inner
            .state
            .provider_status
            .mark(provider, ProviderState::Error, Some(error.to_string()))
            .await;
        self.audit(EmbeddingEvent {
            user_id,
            provider,
            model: model.name.to_owned(),
            text_count,
            token_count: 0,
            success: false,
            latency_ms,
            error: Some(error.to_string()),
            fallback_reason: None,
            occurred_at: Timestamp::now(),
        });
    }

    async fn generate_local(
        &self,
        texts: &[String],
        user_id: Uuid,
        fallback_reason: Option<FallbackReason>,
        attempts: usize,
    ) -> EmbeddingOutput {
        let provider = ProviderId::Local;
        let model = provider.config().default_model();
        let started_at = Instant::now();
        let vectors = LocalEmbedder::new().embed(texts, model.dimensions);
        let latency_ms = started_at.elapsed().as_millis() as u64;
        let tokens = self.inner.tokenizer.count_all(texts);
        let state = &self.inner.state;

        state.provider_status.mark_available(provider).await;
        state
            .usage
            .record(
                user_id,
                provider,
                texts.len() as u64,
                tokens,
                0.0,
                fallback_reason.is_some(),
            )
            .await;
        self.audit(EmbeddingEvent {
            user_id,
            provider,
            model: model.name.to_owned(),
            text_count: texts.len(),
            token_count: tokens,
            success: true,
            latency_ms,
            error: None,
            fallback_reason,
            occurred_at: Timestamp::now(),
        });

        EmbeddingOutput {
            vectors,
            metadata: EmbeddingMetadata {
                provider,
                model: model.name.to_owned(),
                dimensions: model.dimensions,
                text_count: texts.len(),
                tokens,
                cost: 0.0,
                latency_ms,
                rate_limit: None,
                fallback_reason,
                stub: false,
                key_source: None,
                attempts,
            },
        }
    }

    fn audit(&self, event: EmbeddingEvent) {
        let audit = self.inner.audit.clone();
        tokio::spawn(async move {
            if let Err(error) = audit.log_embedding_operation(event).await {
                tracing::warn!(
                    target: TRACING_TARGET_SERVICE,
                    error = %error,
                    "Failed to record audit event"
                );
            }
        });
    }

    /// Returns status and registry data of every provider.
    pub async fn get_provider_status(&self) -> BTreeMap<ProviderId, ProviderStatusReport> {
        let snapshot = self.inner.state.provider_status.snapshot().await;
        let priority = &self.inner.config.provider_priority;

        ProviderId::iter()
            .map(|provider| {
                let entry = snapshot.get(&provider).cloned().unwrap_or_default();
                let config = provider.config();
                let report = ProviderStatusReport {
                    status: entry.state,
                    last_error: entry.last_error,
                    last_checked: entry.last_checked,
                    successes: entry.successes,
                    failures: entry.failures,
                    enabled: provider.is_local() || priority.contains(&provider),
                    models: config.models,
                    rate_limits: self.inner.state.rate_limiter.limits_for(provider),
                    cost_per_1k_tokens: config.cost_per_1k_tokens,
                };
                (provider, report)
            })
            .collect()
    }

    /// Summarizes provider availability.
    ///
    /// Healthy while a network provider has served recently or nothing has
    /// been tried; degraded when only the local fallback is serving.
    pub async fn health(&self) -> ServiceHealth {
        let snapshot = self.inner.state.provider_status.snapshot().await;
        let network: Vec<_> = snapshot
            .iter()
            .filter(|(provider, _)| !provider.is_local())
            .collect();

        let available = network
            .iter()
            .filter(|(_, entry)| entry.state == ProviderState::Available)
            .count();
        let tried = network
            .iter()
            .filter(|(_, entry)| entry.state != ProviderState::Unknown)
            .count();

        let health = if available > 0 || tried == 0 {
            ServiceHealth::healthy()
        } else {
            ServiceHealth::degraded("no network provider available, serving local fallback")
        };
        snapshot.iter().fold(health, |health, (provider, entry)| {
            health.with_detail(provider.to_string(), entry.state.to_string())
        })
    }

    /// Returns a user's usage over the retention period.
    pub async fn usage_summary(&self, user_id: Uuid) -> UsageSummary {
        self.inner.state.usage.usage_summary(user_id).await
    }

    /// Drops expired cache entries, idle windows and old usage.
    pub async fn purge_expired(&self) -> PurgeReport {
        self.inner.state.purge_expired().await
    }
}
