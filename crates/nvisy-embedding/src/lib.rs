#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for provider adapters.
pub const TRACING_TARGET_PROVIDER: &str = "nvisy_embedding::provider";

/// Tracing target for key resolution.
pub const TRACING_TARGET_CREDENTIALS: &str = "nvisy_embedding::credentials";

/// Tracing target for the rate limiter.
pub const TRACING_TARGET_LIMITER: &str = "nvisy_embedding::limiter";

/// Tracing target for usage accounting.
pub const TRACING_TARGET_USAGE: &str = "nvisy_embedding::usage";

/// Tracing target for audit events.
pub const TRACING_TARGET_AUDIT: &str = "nvisy_embedding::audit";

/// Tracing target for the fallback orchestrator.
pub const TRACING_TARGET_SERVICE: &str = "nvisy_embedding::service";

pub mod credentials;
pub mod limiter;
pub mod provider;
pub mod service;
pub mod usage;

mod state;
mod tokenizer;

pub use nvisy_core::{Error, ErrorKind, Result};
pub use provider::ProviderId;
pub use service::{
    EmbeddingConfig, EmbeddingMetadata, EmbeddingOutput, EmbeddingService,
    EmbeddingServiceBuilder, FallbackReason,
};
pub use state::{EmbeddingState, PurgeReport};
pub use tokenizer::{ApproximateTokenizer, Tokenizer};
