//! Result metadata of a generation call.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::credentials::KeySource;
use crate::limiter::RateLimitInfo;
use crate::provider::ProviderId;

/// Why the local fallback produced the vectors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackReason {
    /// Every configured provider was keyless, rate limited or failing.
    AllProvidersFailed,
}

/// Describes how a batch of vectors was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    /// Provider that produced the vectors.
    pub provider: ProviderId,
    /// Model name.
    pub model: String,
    /// Vector length.
    pub dimensions: usize,
    /// Number of input texts.
    pub text_count: usize,
    /// Billed (or estimated) tokens.
    pub tokens: u64,
    /// Cost in USD.
    pub cost: f64,
    /// Wall time of the successful provider call.
    pub latency_ms: u64,
    /// Rate limit window after this call; absent for the local provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
    /// Set when the local fallback served the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    /// Whether a placeholder adapter produced the vectors.
    pub stub: bool,
    /// Origin of the API key used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_source: Option<KeySource>,
    /// Providers considered before success, the successful one included.
    pub attempts: usize,
}

impl EmbeddingMetadata {
    /// Returns true if the vectors come from the local fallback.
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Vectors together with their metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Generation metadata.
    pub metadata: EmbeddingMetadata,
}

impl EmbeddingOutput {
    /// Splits the output into vectors and metadata.
    pub fn into_parts(self) -> (Vec<Vec<f32>>, EmbeddingMetadata) {
        (self.vectors, self.metadata)
    }
}
