//! Worker error types.

use std::borrow::Cow;

use uuid::Uuid;

/// Result type alias for worker operations.
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

/// Worker error type.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Task request was rejected before queuing.
    #[error("invalid task: {0}")]
    InvalidTask(Cow<'static, str>),

    /// Task does not exist or was evicted.
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Embedding generation failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] nvisy_core::Error),

    /// Failed to process a task.
    #[error("task processing failed: {message}")]
    Processing {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker configuration is inconsistent.
    #[error("invalid worker configuration: {0}")]
    Configuration(Cow<'static, str>),
}

impl WorkerError {
    /// Creates an invalid task error.
    pub fn invalid_task(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidTask(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a processing error with a message.
    pub fn processing(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Processing {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a processing error with a message and source.
    pub fn processing_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the request itself was invalid and must not be retried.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::InvalidTask(_) | Self::Configuration(_) => true,
            Self::Embedding(err) => err.kind() == nvisy_core::ErrorKind::InvalidInput,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(WorkerError::invalid_task("empty").is_validation());
        assert!(WorkerError::from(nvisy_core::Error::invalid_input()).is_validation());
        assert!(!WorkerError::from(nvisy_core::Error::network_error()).is_validation());
        assert!(!WorkerError::processing("boom").is_validation());
    }
}
