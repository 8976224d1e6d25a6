//! Embedding service configuration.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use nvisy_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::ApiKey;
use crate::provider::{DEFAULT_OPENAI_BASE_URL, ProviderId};

/// Default sliding window length in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default key cache TTL in seconds.
pub const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 300;

/// Default usage retention in days.
pub const DEFAULT_USAGE_RETENTION_DAYS: u16 = 30;

/// Default provider request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration of the [`EmbeddingService`].
///
/// [`EmbeddingService`]: super::EmbeddingService
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct EmbeddingConfig {
    /// Providers tried in order; the local fallback always runs last.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "embedding-providers",
            env = "EMBEDDING_PROVIDERS",
            value_delimiter = ',',
            default_values_t = default_provider_priority()
        )
    )]
    #[serde(default = "default_provider_priority")]
    pub provider_priority: Vec<ProviderId>,

    /// Sliding window length of the rate limiter, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "embedding-rate-limit-window",
            env = "EMBEDDING_RATE_LIMIT_WINDOW_SECS",
            default_value_t = DEFAULT_RATE_LIMIT_WINDOW_SECS
        )
    )]
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Lifetime of resolved keys in the cache, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "embedding-key-cache-ttl",
            env = "EMBEDDING_KEY_CACHE_TTL_SECS",
            default_value_t = DEFAULT_KEY_CACHE_TTL_SECS
        )
    )]
    #[serde(default = "default_key_cache_ttl_secs")]
    pub key_cache_ttl_secs: u64,

    /// Days of usage history kept in the ledger.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "embedding-usage-retention",
            env = "EMBEDDING_USAGE_RETENTION_DAYS",
            default_value_t = DEFAULT_USAGE_RETENTION_DAYS
        )
    )]
    #[serde(default = "default_usage_retention_days")]
    pub usage_retention_days: u16,

    /// Base URL of the OpenAI API.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "openai-base-url",
            env = "OPENAI_BASE_URL",
            default_value = DEFAULT_OPENAI_BASE_URL
        )
    )]
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Timeout of one provider request, in seconds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "embedding-request-timeout",
            env = "EMBEDDING_REQUEST_TIMEOUT_SECS",
            default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
        )
    )]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// OpenAI model used when the caller names none.
    #[cfg_attr(
        feature = "config",
        arg(long = "openai-model", env = "OPENAI_EMBEDDING_MODEL")
    )]
    #[serde(default)]
    pub openai_model: Option<String>,

    /// Cohere model used when the caller names none.
    #[cfg_attr(
        feature = "config",
        arg(long = "cohere-model", env = "COHERE_EMBEDDING_MODEL")
    )]
    #[serde(default)]
    pub cohere_model: Option<String>,

    /// Gemini model used when the caller names none.
    #[cfg_attr(
        feature = "config",
        arg(long = "gemini-model", env = "GEMINI_EMBEDDING_MODEL")
    )]
    #[serde(default)]
    pub gemini_model: Option<String>,

    /// System OpenAI key.
    #[cfg_attr(
        feature = "config",
        arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)
    )]
    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<ApiKey>,

    /// System Cohere key.
    #[cfg_attr(
        feature = "config",
        arg(long = "cohere-api-key", env = "COHERE_API_KEY", hide_env_values = true)
    )]
    #[serde(default, skip_serializing)]
    pub cohere_api_key: Option<ApiKey>,

    /// System Gemini key.
    #[cfg_attr(
        feature = "config",
        arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true)
    )]
    #[serde(default, skip_serializing)]
    pub gemini_api_key: Option<ApiKey>,
}

fn default_provider_priority() -> Vec<ProviderId> {
    vec![ProviderId::OpenAi, ProviderId::Cohere, ProviderId::Gemini]
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}

fn default_key_cache_ttl_secs() -> u64 {
    DEFAULT_KEY_CACHE_TTL_SECS
}

fn default_usage_retention_days() -> u16 {
    DEFAULT_USAGE_RETENTION_DAYS
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_owned()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_priority: default_provider_priority(),
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            key_cache_ttl_secs: DEFAULT_KEY_CACHE_TTL_SECS,
            usage_retention_days: DEFAULT_USAGE_RETENTION_DAYS,
            openai_base_url: default_openai_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            openai_model: None,
            cohere_model: None,
            gemini_model: None,
            openai_api_key: None,
            cohere_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider_priority", &self.provider_priority)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("key_cache_ttl_secs", &self.key_cache_ttl_secs)
            .field("usage_retention_days", &self.usage_retention_days)
            .field("openai_base_url", &self.openai_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("openai_model", &self.openai_model)
            .field("cohere_model", &self.cohere_model)
            .field("gemini_model", &self.gemini_model)
            .field("system_keys", &self.system_keys().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EmbeddingConfig {
    /// Sets the provider priority.
    pub fn with_provider_priority(mut self, priority: impl IntoIterator<Item = ProviderId>) -> Self {
        self.provider_priority = priority.into_iter().collect();
        self
    }

    /// Sets the rate limit window.
    pub fn with_rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window_secs = window.as_secs();
        self
    }

    /// Sets the key cache TTL.
    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Sets the OpenAI base URL.
    pub fn with_openai_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openai_base_url = base_url.into();
        self
    }

    /// Sets the provider request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the system key of a provider. Ignored for the local provider.
    pub fn with_system_key(mut self, provider: ProviderId, key: impl Into<ApiKey>) -> Self {
        let key = Some(key.into());
        match provider {
            ProviderId::OpenAi => self.openai_api_key = key,
            ProviderId::Cohere => self.cohere_api_key = key,
            ProviderId::Gemini => self.gemini_api_key = key,
            ProviderId::Local => {}
        }
        self
    }

    /// Sets the model a provider uses when the caller names none.
    pub fn with_default_model(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        let model = Some(model.into());
        match provider {
            ProviderId::OpenAi => self.openai_model = model,
            ProviderId::Cohere => self.cohere_model = model,
            ProviderId::Gemini => self.gemini_model = model,
            ProviderId::Local => {}
        }
        self
    }

    /// Returns the configured default model of a provider.
    pub fn default_model(&self, provider: ProviderId) -> Option<&str> {
        match provider {
            ProviderId::OpenAi => self.openai_model.as_deref(),
            ProviderId::Cohere => self.cohere_model.as_deref(),
            ProviderId::Gemini => self.gemini_model.as_deref(),
            ProviderId::Local => None,
        }
    }

    /// Returns the rate limit window.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Returns the key cache TTL.
    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_ttl_secs)
    }

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the configured, non-blank system keys.
    pub fn system_keys(&self) -> HashMap<ProviderId, ApiKey> {
        [
            (ProviderId::OpenAi, &self.openai_api_key),
            (ProviderId::Cohere, &self.cohere_api_key),
            (ProviderId::Gemini, &self.gemini_api_key),
        ]
        .into_iter()
        .filter_map(|(provider, key)| {
            key.as_ref()
                .filter(|key| !key.is_blank())
                .map(|key| (provider, key.clone()))
        })
        .collect()
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_window_secs == 0 {
            return Err(Error::configuration().with_message("rate limit window must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::configuration().with_message("request timeout must be positive"));
        }
        if self.usage_retention_days == 0 {
            return Err(Error::configuration().with_message("usage retention must be positive"));
        }
        for (i, provider) in self.provider_priority.iter().enumerate() {
            if self.provider_priority[..i].contains(provider) {
                return Err(Error::configuration()
                    .with_message(format!("provider '{provider}' listed more than once")));
            }
        }
        for provider in [ProviderId::OpenAi, ProviderId::Cohere, ProviderId::Gemini] {
            if let Some(model) = self.default_model(provider)
                && provider.config().model(model).is_none()
            {
                return Err(Error::configuration()
                    .with_message(format!("unknown {provider} model '{model}'")));
            }
        }
        if !self.openai_base_url.starts_with("http://") && !self.openai_base_url.starts_with("https://") {
            return Err(Error::configuration()
                .with_message(format!("invalid OpenAI base URL '{}'", self.openai_base_url)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::ErrorKind;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EmbeddingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.key_cache_ttl(), Duration::from_secs(300));
        assert!(config.system_keys().is_empty());
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let config = EmbeddingConfig::default()
            .with_provider_priority([ProviderId::OpenAi, ProviderId::OpenAi]);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_system_keys_and_redaction() {
        let config = EmbeddingConfig::default()
            .with_system_key(ProviderId::OpenAi, "sk-secret")
            .with_system_key(ProviderId::Gemini, " ");
        let keys = config.system_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[&ProviderId::OpenAi].expose(), "sk-secret");
        assert!(!format!("{config:?}").contains("sk-secret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EmbeddingConfig =
            serde_json::from_str(r#"{"provider_priority": ["cohere", "openai"]}"#).unwrap();
        assert_eq!(config.provider_priority, vec![ProviderId::Cohere, ProviderId::OpenAi]);
        assert_eq!(config.rate_limit_window_secs, 60);
    }

    #[test]
    fn test_default_model_must_exist() {
        let config = EmbeddingConfig::default()
            .with_default_model(ProviderId::OpenAi, "text-embedding-3-large");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.default_model(ProviderId::OpenAi),
            Some("text-embedding-3-large")
        );
        assert_eq!(config.default_model(ProviderId::Cohere), None);

        let config = EmbeddingConfig::default().with_default_model(ProviderId::Gemini, "nope");
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
