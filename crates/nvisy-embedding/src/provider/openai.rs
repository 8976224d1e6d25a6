//! OpenAI embeddings client built on reqwest.

use std::sync::Arc;
use std::time::Duration;

use nvisy_core::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{GeneratedEmbeddings, ModelSpec, TokenUsage};
use crate::TRACING_TARGET_PROVIDER;
use crate::credentials::ApiKey;

/// Default base URL of the OpenAI API.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug)]
struct OpenAiClientInner {
    http: Client,
    base_url: String,
}

/// Client for the OpenAI `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

impl OpenAiClient {
    /// Creates a new client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nvisy-embedding/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                Error::configuration()
                    .with_message("failed to build HTTP client")
                    .with_source(e)
            })?;

        tracing::debug!(
            target: TRACING_TARGET_PROVIDER,
            base_url = %base_url,
            timeout_ms = timeout.as_millis(),
            "Created OpenAI client"
        );

        Ok(Self {
            inner: Arc::new(OpenAiClientInner { http, base_url }),
        })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Embeds `texts`, splitting into requests of at most `model.max_batch`.
    ///
    /// Vectors are returned in input order.
    pub async fn embed(
        &self,
        texts: &[String],
        model: &ModelSpec,
        api_key: &ApiKey,
    ) -> Result<GeneratedEmbeddings> {
        let mut vectors = Vec::with_capacity(texts.len());
        let mut usage = TokenUsage::default();

        for batch in texts.chunks(model.max_batch.max(1)) {
            let (batch_vectors, batch_usage) = self.embed_batch(batch, model, api_key).await?;
            vectors.extend(batch_vectors);
            usage += batch_usage;
        }

        Ok(GeneratedEmbeddings {
            vectors,
            usage: Some(usage),
        })
    }

    async fn embed_batch(
        &self,
        batch: &[String],
        model: &ModelSpec,
        api_key: &ApiKey,
    ) -> Result<(Vec<Vec<f32>>, TokenUsage)> {
        let url = format!("{}/embeddings", self.inner.base_url);
        let request = EmbeddingRequest {
            model: model.name,
            input: batch,
            encoding_format: "float",
        };

        let response = self
            .inner
            .http
            .post(&url)
            .bearer_auth(api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(512).collect();
            tracing::warn!(
                target: TRACING_TARGET_PROVIDER,
                status = status.as_u16(),
                model = model.name,
                "OpenAI embeddings request rejected"
            );
            return Err(map_status(status, body));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::external_error()
                .with_message("malformed embeddings response")
                .with_source(e)
        })?;

        if parsed.data.len() != batch.len() {
            return Err(Error::external_error().with_message(format!(
                "expected {} embeddings, received {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != model.dimensions {
                return Err(Error::external_error().with_message(format!(
                    "expected {} dimensions, received {}",
                    model.dimensions,
                    item.embedding.len()
                )));
            }
            vectors.push(item.embedding);
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: 0,
                total: u.total_tokens,
            })
            .unwrap_or_default();

        Ok((vectors, usage))
    }
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout()
            .with_message("embeddings request timed out")
            .with_source(err)
    } else if err.is_connect() {
        Error::network_error()
            .with_message("connection failed")
            .with_source(err)
    } else {
        Error::network_error()
            .with_message(err.to_string())
            .with_source(err)
    }
}

fn map_status(status: StatusCode, body: String) -> Error {
    let message = format!("HTTP {}: {body}", status.as_u16());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::authentication().with_message(message)
        }
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited().with_message(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::invalid_input().with_message(message)
        }
        s if s.is_server_error() => Error::service_unavailable().with_message(message),
        _ => Error::external_error().with_message(message),
    }
}

#[cfg(test)]
mod tests {
    use nvisy_core::ErrorKind;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let kind = |code: u16| map_status(StatusCode::from_u16(code).unwrap(), String::new()).kind;
        assert_eq!(kind(401), ErrorKind::Authentication);
        assert_eq!(kind(403), ErrorKind::Authentication);
        assert_eq!(kind(429), ErrorKind::RateLimited);
        assert_eq!(kind(400), ErrorKind::InvalidInput);
        assert_eq!(kind(503), ErrorKind::ServiceUnavailable);
        assert_eq!(kind(404), ErrorKind::ExternalError);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = OpenAiClient::new("http://localhost:1234/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/v1");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.5, 0.5]},
                {"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}
            ],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|item| item.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(parsed.usage.unwrap().total_tokens, 4);
    }
}
