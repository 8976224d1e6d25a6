//! Embedding providers.
//!
//! [`ProviderId`] names a backend, [`ProviderConfig`] holds its static catalog
//! (models, limits, cost) and [`EmbeddingAdapter`] performs the generation.

mod adapter;
mod local;
mod openai;
mod registry;

pub use adapter::{EmbeddingAdapter, GeneratedEmbeddings, StubKind, TokenUsage};
pub use local::{LOCAL_DIMENSIONS, LocalEmbedder};
pub use openai::{DEFAULT_OPENAI_BASE_URL, OpenAiClient};
pub use registry::{ModelSpec, ProviderConfig, RateLimits};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Identifier of an embedding backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderId {
    /// OpenAI embeddings API.
    OpenAi,
    /// Cohere embeddings (stub).
    Cohere,
    /// Google Gemini embeddings (stub).
    Gemini,
    /// Deterministic in-process embedder.
    Local,
}

impl ProviderId {
    /// Returns the static configuration for this provider.
    pub fn config(self) -> &'static ProviderConfig {
        ProviderConfig::get(self)
    }

    /// Returns true if calls to this provider need an API key.
    pub fn requires_api_key(self) -> bool {
        self != Self::Local
    }

    /// Returns true for the in-process fallback provider.
    pub fn is_local(self) -> bool {
        self == Self::Local
    }
}
