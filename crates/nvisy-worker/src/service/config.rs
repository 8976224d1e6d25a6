//! Worker configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use super::ChunkingStrategy;
use crate::{Result, WorkerError};

/// Default maximum number of tasks processed simultaneously.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;

/// Default number of chunks per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default first retry delay in seconds.
pub const DEFAULT_RETRY_BACKOFF_BASE_SECS: u64 = 60;

/// Default maximum retry delay in seconds.
pub const DEFAULT_RETRY_BACKOFF_CAP_SECS: u64 = 300;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default retention of finished tasks in seconds.
pub const DEFAULT_TASK_TTL_SECS: u64 = 24 * 60 * 60;

/// Default interval between maintenance passes in seconds.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Worker behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct WorkerConfig {
    /// Maximum tasks a worker processes simultaneously.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-max-concurrent-tasks",
            env = "WORKER_MAX_CONCURRENT_TASKS",
            default_value_t = DEFAULT_MAX_CONCURRENT_TASKS
        )
    )]
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Chunks sent per embedding call.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-batch-size",
            env = "WORKER_BATCH_SIZE",
            default_value_t = DEFAULT_BATCH_SIZE
        )
    )]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries after the first failed attempt.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-retry-limit",
            env = "WORKER_RETRY_LIMIT",
            default_value_t = DEFAULT_RETRY_LIMIT
        )
    )]
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Delay before the first retry, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-retry-backoff-base",
            env = "WORKER_RETRY_BACKOFF_BASE_SECS",
            default_value_t = DEFAULT_RETRY_BACKOFF_BASE_SECS
        )
    )]
    #[serde(default = "default_retry_backoff_base_secs")]
    pub retry_backoff_base_secs: u64,

    /// Upper bound of the retry delay, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-retry-backoff-cap",
            env = "WORKER_RETRY_BACKOFF_CAP_SECS",
            default_value_t = DEFAULT_RETRY_BACKOFF_CAP_SECS
        )
    )]
    #[serde(default = "default_retry_backoff_cap_secs")]
    pub retry_backoff_cap_secs: u64,

    /// Chunk size in characters.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-chunk-size",
            env = "WORKER_CHUNK_SIZE",
            default_value_t = DEFAULT_CHUNK_SIZE
        )
    )]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-chunk-overlap",
            env = "WORKER_CHUNK_OVERLAP",
            default_value_t = DEFAULT_CHUNK_OVERLAP
        )
    )]
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// How documents are split into chunks.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-chunking-strategy",
            env = "WORKER_CHUNKING_STRATEGY",
            value_enum,
            default_value_t = ChunkingStrategy::Fixed
        )
    )]
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,

    /// How long finished tasks stay queryable, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-task-ttl",
            env = "WORKER_TASK_TTL_SECS",
            default_value_t = DEFAULT_TASK_TTL_SECS
        )
    )]
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,

    /// Interval between maintenance passes, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "worker-maintenance-interval",
            env = "WORKER_MAINTENANCE_INTERVAL_SECS",
            default_value_t = DEFAULT_MAINTENANCE_INTERVAL_SECS
        )
    )]
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_retry_backoff_base_secs() -> u64 {
    DEFAULT_RETRY_BACKOFF_BASE_SECS
}

fn default_retry_backoff_cap_secs() -> u64 {
    DEFAULT_RETRY_BACKOFF_CAP_SECS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_task_ttl_secs() -> u64 {
    DEFAULT_TASK_TTL_SECS
}

fn default_maintenance_interval_secs() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_SECS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            batch_size: DEFAULT_BATCH_SIZE,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_backoff_base_secs: DEFAULT_RETRY_BACKOFF_BASE_SECS,
            retry_backoff_cap_secs: DEFAULT_RETRY_BACKOFF_CAP_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            chunking_strategy: ChunkingStrategy::default(),
            task_ttl_secs: DEFAULT_TASK_TTL_SECS,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Sets the concurrency limit.
    pub fn with_max_concurrent_tasks(mut self, max_concurrent_tasks: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the retry limit.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets chunk size and overlap.
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Sets the chunking strategy.
    pub fn with_chunking_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.chunking_strategy = strategy;
        self
    }

    /// Returns the first retry delay.
    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_base_secs)
    }

    /// Returns the maximum retry delay.
    pub fn retry_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_cap_secs)
    }

    /// Returns the finished task retention.
    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }

    /// Returns the maintenance interval.
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Delay before the retry that follows an attempt with `retry_count`
    /// previous retries: `min(base * 2^retry_count, cap)`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry_count);
        let delay = self.retry_backoff_base_secs.saturating_mul(factor);
        Duration::from_secs(delay.min(self.retry_backoff_cap_secs))
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(WorkerError::configuration("max_concurrent_tasks must be positive"));
        }
        if self.batch_size == 0 {
            return Err(WorkerError::configuration("batch_size must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(WorkerError::configuration("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(WorkerError::configuration(
                "chunk_overlap must be smaller than chunk_size",
            ));
        }
        if self.retry_backoff_base_secs > self.retry_backoff_cap_secs {
            return Err(WorkerError::configuration(
                "retry backoff base must not exceed the cap",
            ));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(WorkerError::configuration(
                "maintenance interval must be positive",
            ));
        }
        Ok(())
    }
}
