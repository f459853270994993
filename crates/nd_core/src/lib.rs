pub mod config;
pub mod corpus;
pub mod error;
pub mod ledger;
pub mod models;
pub mod storage;
pub mod types;

pub use config::{AppConfig, NoveltyMode, ScoringWeights, SourceConfig, SourceScores};
pub use corpus::Corpus;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use models::EmbeddingProvider;
pub use storage::CurationStore;
pub use types::{Article, ClusterDigest, DigestSelection, NormalizedArticle, RawArticle};

/// Cosine similarity of two vectors, accumulated in `f64` in index order so
/// the result is reproducible bit for bit.
///
/// A zero vector has no direction; its similarity to anything is `0.0`.
/// Vectors of different lengths are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub mod prelude {
    pub use super::{
        cosine_similarity, Article, Corpus, CurationStore, EmbeddingProvider, Error, Ledger,
        NormalizedArticle, RawArticle, Result,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
