//! `nvisy providers`.

use nvisy_embedding::EmbeddingService;
use serde_json::json;

use super::print_json;

pub(super) async fn run(embedding: &EmbeddingService) -> anyhow::Result<()> {
    let health = embedding.health().await;
    let providers = embedding.get_provider_status().await;
    print_json(&json!({
        "health": health,
        "providers": providers,
    }))
}
