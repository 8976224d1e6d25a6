//! Sliding-window rate limiting per (user, provider).
//!
//! Each (user, provider, metric) pair owns a window of timestamped entries.
//! Pruning, checking and recording happen under a single lock acquisition, so
//! two concurrent calls can never both pass the same boundary.

mod window;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;
use window::RateLimitWindow;

use crate::TRACING_TARGET_LIMITER;
use crate::provider::{ProviderId, RateLimits};

/// Why a request was rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    /// The request count reached the limit.
    RequestLimitExceeded,
    /// The request would push the token count over the limit.
    TokenLimitExceeded,
}

/// Window state reported with every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests counted in the window, including this one when allowed.
    pub requests_used: u64,
    /// Request limit of the window.
    pub requests_limit: u64,
    /// Tokens counted in the window, including this request when allowed.
    pub tokens_used: u64,
    /// Token limit of the window.
    pub tokens_limit: u64,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Seconds until the rejected request could pass; zero when allowed.
    pub reset_in_secs: u64,
    /// Rejection reason, if rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

/// Outcome of [`RateLimiter::check_and_consume`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Window state.
    pub info: RateLimitInfo,
}

/// Request and token windows of one (user, provider) pair.
#[derive(Debug, Default)]
struct WindowPair {
    requests: RateLimitWindow,
    tokens: RateLimitWindow,
}

type WindowKey = (Uuid, ProviderId);

/// Sliding-window request and token limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<WindowKey, WindowPair>>>,
    overrides: Arc<HashMap<ProviderId, RateLimits>>,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter with window length `window`.
    pub fn new(window: Duration) -> Self {
        tracing::debug!(
            target: TRACING_TARGET_LIMITER,
            window_secs = window.as_secs(),
            "Rate limiter initialized"
        );

        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            overrides: Arc::new(HashMap::new()),
            window,
        }
    }

    /// Overrides the registry limits for one provider.
    pub fn with_limits(mut self, provider: ProviderId, limits: RateLimits) -> Self {
        Arc::make_mut(&mut self.overrides).insert(provider, limits);
        self
    }

    /// Returns the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the limits applied to a provider.
    pub fn limits_for(&self, provider: ProviderId) -> RateLimits {
        self.overrides
            .get(&provider)
            .copied()
            .unwrap_or(provider.config().rate_limits)
    }

    /// Checks whether one request carrying `tokens` may proceed and, if so,
    /// records it.
    pub async fn check_and_consume(
        &self,
        user_id: Uuid,
        provider: ProviderId,
        tokens: u64,
    ) -> RateLimitDecision {
        let limits = self.limits_for(provider);
        let now = Instant::now();

        let mut windows = self.windows.lock().await;
        let pair = windows.entry((user_id, provider)).or_default();
        pair.requests.prune(now, self.window);
        pair.tokens.prune(now, self.window);

        let requests_used = pair.requests.total();
        let tokens_used = pair.tokens.total();
        let requests_limit = u64::from(limits.requests_per_window);
        let tokens_limit = limits.tokens_per_window;

        let reason = if requests_used >= requests_limit {
            Some(RejectReason::RequestLimitExceeded)
        } else if tokens_used.saturating_add(tokens) > tokens_limit {
            Some(RejectReason::TokenLimitExceeded)
        } else {
            None
        };

        let mut info = RateLimitInfo {
            requests_used,
            requests_limit,
            tokens_used,
            tokens_limit,
            window_secs: self.window.as_secs(),
            reset_in_secs: 0,
            reason,
        };

        match reason {
            None => {
                pair.requests.record(now, 1);
                pair.tokens.record(now, tokens);
                info.requests_used += 1;
                info.tokens_used += tokens;
                RateLimitDecision {
                    allowed: true,
                    info,
                }
            }
            Some(reason) => {
                let reset_in = match reason {
                    RejectReason::RequestLimitExceeded => pair.requests.reset_in(
                        now,
                        self.window,
                        requests_used + 1 - requests_limit,
                    ),
                    RejectReason::TokenLimitExceeded => pair.tokens.reset_in(
                        now,
                        self.window,
                        (tokens_used + tokens).saturating_sub(tokens_limit),
                    ),
                };
                info.reset_in_secs = reset_in.as_secs_f64().ceil() as u64;

                tracing::debug!(
                    target: TRACING_TARGET_LIMITER,
                    user_id = %user_id,
                    provider = %provider,
                    reason = %reason,
                    reset_in_secs = info.reset_in_secs,
                    "Rate limit exceeded"
                );

                RateLimitDecision {
                    allowed: false,
                    info,
                }
            }
        }
    }

    /// Drops windows idle for longer than twice the window length.
    pub async fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.window * 2;
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, pair| {
            !(pair.requests.is_idle(now, ttl) && pair.tokens.is_idle(now, ttl))
        });
        before - windows.len()
    }

    /// Number of (user, provider) pairs currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter(requests: u32, tokens: u64) -> RateLimiter {
        RateLimiter::new(WINDOW).with_limits(ProviderId::OpenAi, RateLimits::new(requests, tokens))
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_limit_and_window_reset() {
        let limiter = limiter(3, 1_000);
        let user = Uuid::new_v4();

        for i in 1..=3 {
            let decision = limiter.check_and_consume(user, ProviderId::OpenAi, 1).await;
            assert!(decision.allowed);
            assert_eq!(decision.info.requests_used, i);
        }

        let rejected = limiter.check_and_consume(user, ProviderId::OpenAi, 1).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.info.reason, Some(RejectReason::RequestLimitExceeded));
        assert_eq!(rejected.info.reset_in_secs, 60);

        tokio::time::advance(Duration::from_secs(30)).await;
        let rejected = limiter.check_and_consume(user, ProviderId::OpenAi, 1).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.info.reset_in_secs, 30);

        tokio::time::advance(Duration::from_secs(31)).await;
        let allowed = limiter.check_and_consume(user, ProviderId::OpenAi, 1).await;
        assert!(allowed.allowed);
        assert_eq!(allowed.info.requests_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_limit() {
        let limiter = limiter(100, 100);
        let user = Uuid::new_v4();

        assert!(limiter.check_and_consume(user, ProviderId::OpenAi, 60).await.allowed);
        assert!(limiter.check_and_consume(user, ProviderId::OpenAi, 40).await.allowed);

        let rejected = limiter.check_and_consume(user, ProviderId::OpenAi, 1).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.info.reason, Some(RejectReason::TokenLimitExceeded));
        assert_eq!(rejected.info.tokens_used, 100);
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_recorded() {
        let limiter = limiter(10, 50);
        let user = Uuid::new_v4();

        assert!(!limiter.check_and_consume(user, ProviderId::OpenAi, 51).await.allowed);
        let decision = limiter.check_and_consume(user, ProviderId::OpenAi, 50).await;
        assert!(decision.allowed);
        assert_eq!(decision.info.requests_used, 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let limiter = limiter(1, 1_000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(limiter.check_and_consume(alice, ProviderId::OpenAi, 1).await.allowed);
        assert!(!limiter.check_and_consume(alice, ProviderId::OpenAi, 1).await.allowed);
        assert!(limiter.check_and_consume(bob, ProviderId::OpenAi, 1).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_calls_respect_limit() {
        let limiter = limiter(10, 1_000_000);
        let user = Uuid::new_v4();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.check_and_consume(user, ProviderId::OpenAi, 1).await.allowed
                })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_idle() {
        let limiter = limiter(10, 1_000);
        limiter.check_and_consume(Uuid::new_v4(), ProviderId::OpenAi, 1).await;
        assert_eq!(limiter.purge_idle().await, 0);

        tokio::time::advance(WINDOW * 2 + Duration::from_secs(1)).await;
        assert_eq!(limiter.purge_idle().await, 1);
        assert_eq!(limiter.tracked_keys().await, 0);
    }
}
