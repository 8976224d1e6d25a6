//! Subcommands.
//!
//! Every command runs against in-memory stores. Provider keys come from the
//! system key configuration only.

mod embed;
mod ingest;
mod providers;

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use nvisy_core::crypto::{EncryptionKey, XChaCha20Cipher};
use nvisy_embedding::credentials::InMemoryKeyStore;
use nvisy_embedding::{EmbeddingConfig, EmbeddingService};

pub use self::embed::EmbedArgs;
pub use self::ingest::IngestArgs;
use crate::config::Cli;

/// Available commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Embeds texts and prints vectors with metadata as JSON.
    Embed(EmbedArgs),
    /// Chunks and embeds a document through the task worker.
    Ingest(IngestArgs),
    /// Prints provider status and catalog data as JSON.
    Providers,
}

impl Command {
    /// Runs the command.
    pub async fn run(self, cli: Cli) -> anyhow::Result<()> {
        let embedding = create_embedding_service(cli.embedding)?;
        match self {
            Self::Embed(args) => embed::run(args, &embedding).await,
            Self::Ingest(args) => ingest::run(args, cli.worker, embedding).await,
            Self::Providers => providers::run(&embedding).await,
        }
    }
}

/// Builds the embedding service over an empty in-memory key store.
fn create_embedding_service(config: EmbeddingConfig) -> anyhow::Result<EmbeddingService> {
    let cipher = Arc::new(XChaCha20Cipher::new(EncryptionKey::generate()));
    EmbeddingService::builder(config, Arc::new(InMemoryKeyStore::new()), cipher)
        .build()
        .context("failed to create embedding service")
}

/// Writes a value to stdout as pretty JSON.
fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
