use std::fmt;

use async_trait::async_trait;
use nd_core::{EmbeddingProvider, Error, Result};
use sha2::{Digest, Sha256};

/// Deterministic feature-hashing embedder.
///
/// Each token is hashed with SHA-256 into a signed bucket; the vector is then
/// L2-normalised. No network, no model files, identical output on every
/// machine, which makes it the default for offline runs and tests.
pub struct HashingModel {
    dimensions: usize,
}

impl fmt::Debug for HashingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashingModel")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl HashingModel {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("hashing model needs at least one dimension".into()));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashingModel {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
