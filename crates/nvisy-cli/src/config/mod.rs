//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── logging: LoggingConfig      # Log output format
//! ├── embedding: EmbeddingConfig  # Provider priority, keys, limits
//! ├── worker: WorkerConfig        # Concurrency, batching, retries, chunking
//! └── command: Command            # embed | ingest | providers
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! nvisy --embedding-providers cohere,openai embed "hello world"
//!
//! # Or via environment variables
//! EMBEDDING_PROVIDERS=cohere,openai nvisy embed "hello world"
//! ```

mod logging;

use std::process;

use anyhow::Context;
use clap::Parser;
pub use logging::{LogFormat, LoggingConfig};
use nvisy_embedding::EmbeddingConfig;
use nvisy_worker::WorkerConfig;

use crate::TRACING_TARGET_CONFIG;
use crate::commands::Command;

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "nvisy")]
#[command(about = "Embedding generation with provider fallback")]
#[command(version)]
pub struct Cli {
    /// Log output configuration.
    #[clap(flatten)]
    pub logging: LoggingConfig,

    /// Embedding providers, keys and limits.
    #[clap(flatten)]
    pub embedding: EmbeddingConfig,

    /// Task worker behavior.
    #[clap(flatten)]
    pub worker: WorkerConfig,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so that its
    /// variables are used as defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.embedding
            .validate()
            .context("invalid embedding configuration")?;
        self.worker
            .validate()
            .context("invalid worker configuration")?;
        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        let system_keys: Vec<_> = self.embedding.system_keys().into_keys().collect();
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            providers = ?self.embedding.provider_priority,
            system_keys = ?system_keys,
            rate_limit_window_secs = self.embedding.rate_limit_window_secs,
            key_cache_ttl_secs = self.embedding.key_cache_ttl_secs,
            "Embedding configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            max_concurrent_tasks = self.worker.max_concurrent_tasks,
            batch_size = self.worker.batch_size,
            retry_limit = self.worker.retry_limit,
            chunk_size = self.worker.chunk_size,
            chunk_overlap = self.worker.chunk_overlap,
            chunking_strategy = %self.worker.chunking_strategy,
            "Worker configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_global_options_before_command() {
        let cli = Cli::try_parse_from([
            "nvisy",
            "--log-format",
            "json",
            "--embedding-providers",
            "cohere,openai",
            "--worker-batch-size",
            "10",
            "providers",
        ])
        .unwrap();

        assert_eq!(cli.logging.log_format, LogFormat::Json);
        assert_eq!(cli.embedding.provider_priority.len(), 2);
        assert_eq!(cli.worker.batch_size, 10);
        assert!(matches!(cli.command, Command::Providers));
        assert!(cli.validate().is_ok());
    }
}
