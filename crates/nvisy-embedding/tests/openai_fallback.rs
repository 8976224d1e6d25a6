//! End-to-end fallback behavior against a mock OpenAI endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use nvisy_core::crypto::{EncryptionKey, KeyCipher, XChaCha20Cipher};
use nvisy_embedding::credentials::{ApiKeyRecord, InMemoryKeyStore};
use nvisy_embedding::limiter::RateLimiter;
use nvisy_embedding::provider::RateLimits;
use nvisy_embedding::service::ProviderState;
use nvisy_embedding::{
    EmbeddingConfig, EmbeddingService, EmbeddingState, FallbackReason, ProviderId,
};
use serde_json::{Value, json};
use uuid::Uuid;

const VALID_KEY: &str = "sk-valid";

#[derive(Default)]
struct MockOpenAi {
    requests: AtomicUsize,
    fail_with: Option<StatusCode>,
}

async fn embeddings(
    State(mock): State<Arc<MockOpenAi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = mock.fail_with {
        return (status, Json(json!({"error": {"message": "boom"}}))).into_response();
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {VALID_KEY}"));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
            .into_response();
    }

    let dimensions = match body["model"].as_str() {
        Some("text-embedding-3-large") => 3072,
        _ => 1536,
    };
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    // Reverse order to check that the client sorts by index.
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| {
            let marker = text
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<f32>().ok())
                .unwrap_or(0.0);
            let mut embedding = vec![0.0f32; dimensions];
            embedding[0] = marker;
            json!({"object": "embedding", "index": index, "embedding": embedding})
        })
        .collect();
    let tokens: usize = inputs.iter().map(|t| t.len().div_ceil(4)).sum();

    Json(json!({
        "object": "list",
        "data": data,
        "model": body["model"],
        "usage": {"prompt_tokens": tokens, "total_tokens": tokens}
    }))
    .into_response()
}

async fn spawn_mock(mock: MockOpenAi) -> (SocketAddr, Arc<MockOpenAi>) {
    let mock = Arc::new(mock);
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, mock)
}

fn config(addr: SocketAddr) -> EmbeddingConfig {
    EmbeddingConfig::default().with_openai_base_url(format!("http://{addr}/v1"))
}

fn service(config: EmbeddingConfig, store: &InMemoryKeyStore, cipher: Arc<XChaCha20Cipher>) -> EmbeddingService {
    EmbeddingService::builder(config, Arc::new(store.clone()), cipher)
        .build()
        .unwrap()
}

fn cipher() -> Arc<XChaCha20Cipher> {
    Arc::new(XChaCha20Cipher::new(EncryptionKey::generate()))
}

#[tokio::test]
async fn test_hello_world_uses_primary_provider() {
    let (addr, mock) = spawn_mock(MockOpenAi::default()).await;
    let service = service(
        config(addr)
            .with_provider_priority([ProviderId::OpenAi, ProviderId::Local])
            .with_system_key(ProviderId::OpenAi, VALID_KEY),
        &InMemoryKeyStore::new(),
        cipher(),
    );

    let (vectors, metadata) = service
        .generate_embeddings(&["hello world".to_owned()], Uuid::new_v4(), None, None)
        .await
        .unwrap()
        .into_parts();

    assert_eq!(metadata.provider, ProviderId::OpenAi);
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].len(), 1536);
    assert_eq!(metadata.dimensions, 1536);
    assert!(metadata.cost > 0.0);
    assert!(metadata.fallback_reason.is_none());
    assert_eq!(metadata.rate_limit.unwrap().requests_used, 1);
    assert_eq!(mock.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_large_input_is_batched_and_ordered() {
    let (addr, mock) = spawn_mock(MockOpenAi::default()).await;
    let service = service(
        config(addr).with_system_key(ProviderId::OpenAi, VALID_KEY),
        &InMemoryKeyStore::new(),
        cipher(),
    );

    let texts: Vec<String> = (0..250).map(|i| format!("text-{i}")).collect();
    let output = service
        .generate_embeddings(&texts, Uuid::new_v4(), None, Some("text-embedding-3-large"))
        .await
        .unwrap();

    assert_eq!(mock.requests.load(Ordering::SeqCst), 3);
    assert_eq!(output.metadata.model, "text-embedding-3-large");
    assert_eq!(output.vectors.len(), 250);
    for (i, vector) in output.vectors.iter().enumerate() {
        assert_eq!(vector.len(), 3072);
        assert_eq!(vector[0], i as f32);
    }
}

#[tokio::test]
async fn test_rejected_user_key_is_invalidated() {
    let (addr, _mock) = spawn_mock(MockOpenAi::default()).await;
    let store = InMemoryKeyStore::new();
    let cipher = cipher();
    let user = Uuid::new_v4();
    store
        .insert(ApiKeyRecord::user(
            user,
            ProviderId::OpenAi,
            cipher.encrypt(b"sk-revoked").unwrap(),
        ))
        .await;
    let service = service(
        config(addr).with_provider_priority([ProviderId::OpenAi]),
        &store,
        cipher,
    );

    let output = service
        .generate_embeddings(&["hello".to_owned()], user, None, None)
        .await
        .unwrap();

    assert_eq!(output.metadata.provider, ProviderId::Local);
    assert_eq!(output.metadata.fallback_reason, Some(FallbackReason::AllProvidersFailed));
    assert!(service.state().key_cache.get(user, ProviderId::OpenAi).await.is_none());

    let status = service.get_provider_status().await;
    let openai = &status[&ProviderId::OpenAi];
    assert_eq!(openai.status, ProviderState::Error);
    assert!(openai.last_error.as_deref().unwrap_or_default().contains("authentication"));
}

#[tokio::test]
async fn test_server_error_falls_through_to_next_provider() {
    let (addr, mock) = spawn_mock(MockOpenAi {
        fail_with: Some(StatusCode::SERVICE_UNAVAILABLE),
        ..Default::default()
    })
    .await;
    let service = service(
        config(addr)
            .with_provider_priority([ProviderId::OpenAi, ProviderId::Cohere])
            .with_system_key(ProviderId::OpenAi, VALID_KEY)
            .with_system_key(ProviderId::Cohere, "co-key"),
        &InMemoryKeyStore::new(),
        cipher(),
    );

    let output = service
        .generate_embeddings(&["hello".to_owned()], Uuid::new_v4(), None, None)
        .await
        .unwrap();

    assert_eq!(mock.requests.load(Ordering::SeqCst), 1);
    assert_eq!(output.metadata.provider, ProviderId::Cohere);
    assert_eq!(output.metadata.attempts, 2);
    assert!(output.metadata.fallback_reason.is_none());
}

#[tokio::test]
async fn test_exhausted_rate_limit_falls_back_to_local() {
    let (addr, mock) = spawn_mock(MockOpenAi::default()).await;
    let config = config(addr)
        .with_provider_priority([ProviderId::OpenAi])
        .with_system_key(ProviderId::OpenAi, VALID_KEY);
    let state = EmbeddingState::from_config(&config).with_rate_limiter(
        RateLimiter::new(config.rate_limit_window())
            .with_limits(ProviderId::OpenAi, RateLimits::new(2, 1_000_000)),
    );
    let service = EmbeddingService::builder(config, Arc::new(InMemoryKeyStore::new()), cipher())
        .with_state(state)
        .build()
        .unwrap();
    let user = Uuid::new_v4();
    let texts = vec!["hello".to_owned()];

    for _ in 0..2 {
        let output = service.generate_embeddings(&texts, user, None, None).await.unwrap();
        assert_eq!(output.metadata.provider, ProviderId::OpenAi);
    }

    let output = service.generate_embeddings(&texts, user, None, None).await.unwrap();
    assert_eq!(output.metadata.provider, ProviderId::Local);
    assert_eq!(output.metadata.fallback_reason, Some(FallbackReason::AllProvidersFailed));
    assert_eq!(mock.requests.load(Ordering::SeqCst), 2);

    let other_user = service
        .generate_embeddings(&texts, Uuid::new_v4(), None, None)
        .await
        .unwrap();
    assert_eq!(other_user.metadata.provider, ProviderId::OpenAi);
}

#[tokio::test]
async fn test_configured_default_model_is_used() {
    let (addr, _mock) = spawn_mock(MockOpenAi::default()).await;
    let service = service(
        config(addr)
            .with_system_key(ProviderId::OpenAi, VALID_KEY)
            .with_default_model(ProviderId::OpenAi, "text-embedding-3-large"),
        &InMemoryKeyStore::new(),
        cipher(),
    );

    let output = service
        .generate_embeddings(&["text-7".to_owned()], Uuid::new_v4(), None, None)
        .await
        .unwrap();
    assert_eq!(output.metadata.model, "text-embedding-3-large");
    assert_eq!(output.metadata.dimensions, 3072);

    // A caller choice the provider offers wins over the configured default.
    let output = service
        .generate_embeddings(
            &["text-7".to_owned()],
            Uuid::new_v4(),
            None,
            Some("text-embedding-3-small"),
        )
        .await
        .unwrap();
    assert_eq!(output.metadata.dimensions, 1536);
}
