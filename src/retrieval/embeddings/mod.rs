//! Deterministic in-process embeddings for the persistent index.
//!
//! The Chroma backend needs query and document vectors but must stay
//! reproducible without a network embedding provider, so documents are
//! embedded with token feature hashing: each token is hashed (SHA-256) into
//! a fixed-dimension bucket and the resulting count vector is L2-normalized.
//! Identical text always produces an identical vector.

use sha2::{Digest, Sha256};

use crate::retrieval::backend::tokenize;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 256;

/// Feature-hashing embedder with a fixed output dimension.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashedEmbedder {
    /// Create an embedder with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// The output dimension of every embedding.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text into a normalized fixed-dimension vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let bucket = self.bucket(&token);
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    /// Embed a batch of documents, one vector per input.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (head as usize) % self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = HashedEmbedder::default();
        let a = embedder.embed("build a spark ETL pipeline");
        let b = embedder.embed("build a spark ETL pipeline");
        assert_eq!(a, b);
    }

    #[test]
    fn test_embedding_has_fixed_dimension_and_unit_norm() {
        let embedder = HashedEmbedder::new(64);
        let vector = embedder.embed("terraform cloud deploys");
        assert_eq!(vector.len(), 64);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embedder = HashedEmbedder::new(8);
        let vector = embedder.embed("   ");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_distinct_texts_usually_differ() {
        let embedder = HashedEmbedder::default();
        assert_ne!(
            embedder.embed("spark streaming jobs"),
            embedder.embed("nginx reverse proxy")
        );
    }
}
