//! Provider status board.

use std::collections::HashMap;
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio::sync::RwLock;

use crate::provider::{ModelSpec, ProviderId, RateLimits};

/// Last observed state of a provider.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderState {
    /// Not tried yet.
    #[default]
    Unknown,
    /// Last call succeeded.
    Available,
    /// No key could be resolved.
    NoApiKey,
    /// Last call was rejected by the rate limiter.
    RateLimited,
    /// Last call failed.
    Error,
}

/// Mutable per-provider status.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatusEntry {
    /// Last observed state.
    pub state: ProviderState,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// When the state was last updated.
    pub last_checked: Option<Timestamp>,
    /// Number of successful calls.
    pub successes: u64,
    /// Number of failed calls.
    pub failures: u64,
}

/// Status and registry data of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatusReport {
    /// Last observed state.
    pub status: ProviderState,
    /// Message of the last failure.
    pub last_error: Option<String>,
    /// When the state was last updated.
    pub last_checked: Option<Timestamp>,
    /// Number of successful calls.
    pub successes: u64,
    /// Number of failed calls.
    pub failures: u64,
    /// Whether the provider is in the configured priority list.
    pub enabled: bool,
    /// Model catalog.
    pub models: &'static [ModelSpec],
    /// Effective rate limits.
    pub rate_limits: RateLimits,
    /// Price in USD per 1000 tokens.
    pub cost_per_1k_tokens: f64,
}

/// Shared board of provider states.
#[derive(Debug, Clone, Default)]
pub struct ProviderStatusBoard {
    entries: Arc<RwLock<HashMap<ProviderId, ProviderStatusEntry>>>,
}

impl ProviderStatusBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a successful call.
    pub async fn mark_available(&self, provider: ProviderId) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(provider).or_default();
        entry.state = ProviderState::Available;
        entry.last_checked = Some(Timestamp::now());
        entry.successes += 1;
    }

    /// Marks a skipped or failed attempt.
    pub async fn mark(&self, provider: ProviderId, state: ProviderState, error: Option<String>) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(provider).or_default();
        entry.state = state;
        entry.last_checked = Some(Timestamp::now());
        if state == ProviderState::Error {
            entry.failures += 1;
        }
        if error.is_some() {
            entry.last_error = error;
        }
    }

    /// Returns the status of one provider.
    pub async fn get(&self, provider: ProviderId) -> ProviderStatusEntry {
        self.entries
            .read()
            .await
            .get(&provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns a copy of every tracked status.
    pub async fn snapshot(&self) -> HashMap<ProviderId, ProviderStatusEntry> {
        self.entries.read().await.clone()
    }
}
