//! Deterministic in-process embedder used as the final fallback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Dimensions produced by [`LocalEmbedder`].
pub const LOCAL_DIMENSIONS: usize = 384;

/// Produces unit-length pseudo-random vectors seeded from a hash of the text.
///
/// The same text always yields the same vector. No network access and no
/// credentials are involved, so it cannot fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    /// Creates a new local embedder.
    pub fn new() -> Self {
        Self
    }

    /// Embeds a single text into `dimensions` components.
    pub fn embed_one(&self, text: &str, dimensions: usize) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

        let mut vector: Vec<f32> = (0..dimensions)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    /// Embeds every text in order.
    pub fn embed(&self, texts: &[String], dimensions: usize) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| self.embed_one(text, dimensions))
            .collect()
    }
}
