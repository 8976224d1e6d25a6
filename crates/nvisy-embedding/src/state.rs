//! Shared mutable state of the embedding service.

use serde::Serialize;

use crate::credentials::KeyCache;
use crate::limiter::RateLimiter;
use crate::service::{EmbeddingConfig, ProviderStatusBoard};
use crate::usage::UsageLedger;
use crate::TRACING_TARGET_SERVICE;

/// Entries dropped by [`EmbeddingState::purge_expired`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Expired key cache entries.
    pub cached_keys: usize,
    /// Idle rate limit windows.
    pub rate_limit_windows: usize,
    /// Usage buckets past retention.
    pub usage_buckets: usize,
}

/// Caches, windows and counters shared by every clone of a service.
///
/// Two services built from different states are fully independent.
#[derive(Debug, Clone)]
pub struct EmbeddingState {
    /// Resolved key cache.
    pub key_cache: KeyCache,
    /// Sliding-window limiter.
    pub rate_limiter: RateLimiter,
    /// Usage ledger.
    pub usage: UsageLedger,
    /// Provider status board.
    pub provider_status: ProviderStatusBoard,
}

impl EmbeddingState {
    /// Creates fresh state from the configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            key_cache: KeyCache::new(config.key_cache_ttl()),
            rate_limiter: RateLimiter::new(config.rate_limit_window()),
            usage: UsageLedger::new(config.usage_retention_days),
            provider_status: ProviderStatusBoard::new(),
        }
    }

    /// Replaces the rate limiter, e.g. to override provider limits.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Drops expired cache entries, idle windows and old usage.
    pub async fn purge_expired(&self) -> PurgeReport {
        let report = PurgeReport {
            cached_keys: self.key_cache.purge_expired().await,
            rate_limit_windows: self.rate_limiter.purge_idle().await,
            usage_buckets: self.usage.purge_expired(UsageLedger::today()).await,
        };

        tracing::debug!(
            target: TRACING_TARGET_SERVICE,
            cached_keys = report.cached_keys,
            rate_limit_windows = report.rate_limit_windows,
            usage_buckets = report.usage_buckets,
            "Purged expired embedding state"
        );

        report
    }
}
