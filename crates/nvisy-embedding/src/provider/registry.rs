//! Static provider registry.
//!
//! Dimensions, batch sizes, limits and prices are fixed per provider and never
//! computed at call time.

use serde::Serialize;

use super::ProviderId;

/// A model offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    /// Model name as sent to the provider.
    pub name: &'static str,
    /// Length of each produced vector.
    pub dimensions: usize,
    /// Maximum number of inputs per request.
    pub max_batch: usize,
    /// Maximum tokens per input.
    pub max_tokens: usize,
}

/// Sliding-window limits applied per (user, provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    /// Requests allowed within one window.
    pub requests_per_window: u32,
    /// Tokens allowed within one window.
    pub tokens_per_window: u64,
}

impl RateLimits {
    /// Limits that never reject.
    pub const UNLIMITED: Self = Self {
        requests_per_window: u32::MAX,
        tokens_per_window: u64::MAX,
    };

    /// Creates new limits.
    pub const fn new(requests_per_window: u32, tokens_per_window: u64) -> Self {
        Self {
            requests_per_window,
            tokens_per_window,
        }
    }

    /// Returns true if these limits can never reject a request.
    pub fn is_unlimited(&self) -> bool {
        *self == Self::UNLIMITED
    }
}

/// Static description of a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub id: ProviderId,
    /// Model catalog; the first entry is the default model.
    pub models: &'static [ModelSpec],
    /// Default rate limits.
    pub rate_limits: RateLimits,
    /// Price in USD per 1000 tokens.
    pub cost_per_1k_tokens: f64,
}

const OPENAI_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "text-embedding-3-small",
        dimensions: 1536,
        max_batch: 100,
        max_tokens: 8191,
    },
    ModelSpec {
        name: "text-embedding-3-large",
        dimensions: 3072,
        max_batch: 100,
        max_tokens: 8191,
    },
    ModelSpec {
        name: "text-embedding-ada-002",
        dimensions: 1536,
        max_batch: 100,
        max_tokens: 8191,
    },
];

const COHERE_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "embed-english-v3.0",
        dimensions: 1024,
        max_batch: 96,
        max_tokens: 512,
    },
    ModelSpec {
        name: "embed-multilingual-v3.0",
        dimensions: 1024,
        max_batch: 96,
        max_tokens: 512,
    },
];

const GEMINI_MODELS: &[ModelSpec] = &[ModelSpec {
    name: "text-embedding-004",
    dimensions: 768,
    max_batch: 100,
    max_tokens: 2048,
}];

const LOCAL_MODELS: &[ModelSpec] = &[ModelSpec {
    name: "local-hash-v1",
    dimensions: super::LOCAL_DIMENSIONS,
    max_batch: 1024,
    max_tokens: usize::MAX,
}];

static OPENAI: ProviderConfig = ProviderConfig {
    id: ProviderId::OpenAi,
    models: OPENAI_MODELS,
    rate_limits: RateLimits::new(3000, 1_000_000),
    cost_per_1k_tokens: 0.00002,
};

static COHERE: ProviderConfig = ProviderConfig {
    id: ProviderId::Cohere,
    models: COHERE_MODELS,
    rate_limits: RateLimits::new(1000, 500_000),
    cost_per_1k_tokens: 0.0001,
};

static GEMINI: ProviderConfig = ProviderConfig {
    id: ProviderId::Gemini,
    models: GEMINI_MODELS,
    rate_limits: RateLimits::new(1500, 1_000_000),
    cost_per_1k_tokens: 0.00001,
};

static LOCAL: ProviderConfig = ProviderConfig {
    id: ProviderId::Local,
    models: LOCAL_MODELS,
    rate_limits: RateLimits::UNLIMITED,
    cost_per_1k_tokens: 0.0,
};

impl ProviderConfig {
    /// Returns the registry entry for a provider.
    pub fn get(id: ProviderId) -> &'static Self {
        match id {
            ProviderId::OpenAi => &OPENAI,
            ProviderId::Cohere => &COHERE,
            ProviderId::Gemini => &GEMINI,
            ProviderId::Local => &LOCAL,
        }
    }

    /// Returns the default model (first catalog entry).
    pub fn default_model(&self) -> &'static ModelSpec {
        &self.models[0]
    }

    /// Looks up a model by name.
    pub fn model(&self, name: &str) -> Option<&'static ModelSpec> {
        self.models.iter().find(|model| model.name == name)
    }

    /// Resolves the requested model, falling back to the default model.
    pub fn resolve_model(&self, requested: Option<&str>) -> &'static ModelSpec {
        requested
            .and_then(|name| self.model(name))
            .unwrap_or_else(|| self.default_model())
    }

    /// Computes the cost of `tokens` tokens.
    pub fn cost(&self, tokens: u64) -> f64 {
        (tokens as f64 / 1000.0) * self.cost_per_1k_tokens
    }
}
