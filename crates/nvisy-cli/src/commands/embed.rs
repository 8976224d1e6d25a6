//! `nvisy embed`.

use anyhow::Context;
use clap::Args;
use nvisy_embedding::{EmbeddingService, ProviderId};
use serde_json::json;
use uuid::Uuid;

use super::print_json;

/// Arguments of `nvisy embed`.
#[derive(Debug, Clone, Args)]
pub struct EmbedArgs {
    /// Texts to embed.
    #[arg(required = true)]
    pub texts: Vec<String>,

    /// Provider to try first.
    #[arg(long)]
    pub provider: Option<ProviderId>,

    /// Model to request from providers that offer it.
    #[arg(long)]
    pub model: Option<String>,

    /// User the request is attributed to. Random if omitted.
    #[arg(long)]
    pub user: Option<Uuid>,
}

pub(super) async fn run(args: EmbedArgs, embedding: &EmbeddingService) -> anyhow::Result<()> {
    let user_id = args.user.unwrap_or_else(Uuid::new_v4);
    let output = embedding
        .generate_embeddings(&args.texts, user_id, args.provider, args.model.as_deref())
        .await
        .context("failed to generate embeddings")?;

    let (vectors, metadata) = output.into_parts();
    print_json(&json!({
        "metadata": metadata,
        "embeddings": vectors,
    }))
}
