//! Uniform generation contract over the provider variants.

use std::ops::AddAssign;

use nvisy_core::{Error, Result};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::{LocalEmbedder, ModelSpec, OpenAiClient, ProviderId};
use crate::credentials::ApiKey;

/// Token usage reported by a provider.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub input: u64,
    /// Output tokens; zero for embeddings.
    pub output: u64,
    /// Total billed tokens.
    pub total: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
        self.total += rhs.total;
    }
}

/// Vectors produced by one adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedEmbeddings {
    /// One vector per input text, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Usage reported by the provider, if any.
    pub usage: Option<TokenUsage>,
}

/// Providers without a production embedding backend yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StubKind {
    /// Cohere.
    Cohere,
    /// Google Gemini.
    Gemini,
}

/// Generation backend for one provider.
#[derive(Debug, Clone)]
pub enum EmbeddingAdapter {
    /// Real network provider.
    Primary(OpenAiClient),
    /// Placeholder that produces local vectors at the stub model's dimensions.
    Stub(StubKind),
    /// Deterministic local embedder.
    Local(LocalEmbedder),
}

impl EmbeddingAdapter {
    /// Builds the adapter for a provider.
    ///
    /// The OpenAI client is shared between calls.
    pub fn for_provider(id: ProviderId, openai: &OpenAiClient) -> Self {
        match id {
            ProviderId::OpenAi => Self::Primary(openai.clone()),
            ProviderId::Cohere => Self::Stub(StubKind::Cohere),
            ProviderId::Gemini => Self::Stub(StubKind::Gemini),
            ProviderId::Local => Self::Local(LocalEmbedder::new()),
        }
    }

    /// Returns true for placeholder adapters.
    pub fn is_stub(&self) -> bool {
        matches!(self, Self::Stub(_))
    }

    /// Generates one vector per text with `model`.
    ///
    /// # Errors
    ///
    /// Network adapters fail without a key or when the provider rejects the
    /// request. Stub and local adapters never fail.
    pub async fn generate(
        &self,
        texts: &[String],
        model: &ModelSpec,
        api_key: Option<&ApiKey>,
    ) -> Result<GeneratedEmbeddings> {
        match self {
            Self::Primary(client) => {
                let api_key = api_key.ok_or_else(|| {
                    Error::authentication().with_message("no API key for primary provider")
                })?;
                client.embed(texts, model, api_key).await
            }
            Self::Stub(_) | Self::Local(_) => Ok(GeneratedEmbeddings {
                vectors: LocalEmbedder::new().embed(texts, model.dimensions),
                usage: None,
            }),
        }
    }
}
