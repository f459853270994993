use std::sync::Arc;

use nd_core::{EmbeddingProvider, Error, NormalizedArticle, Result};

/// Lowercases and collapses runs of whitespace.
pub fn preprocess(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct EmbeddingGenerator {
    model: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<dyn EmbeddingProvider>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// One embedding per article, in input order. Any provider failure is an
    /// enrichment failure for the whole batch.
    pub async fn embed_articles(&self, articles: &[NormalizedArticle]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = articles
            .iter()
            .map(|a| preprocess(&a.embedding_text()))
            .collect();
        let embeddings = self
            .model
            .embed(&texts)
            .await
            .map_err(|e| Error::Inference(format!("{} failed to embed batch: {}", self.model.name(), e)))?;
        if embeddings.len() != articles.len() {
            return Err(Error::Inference(format!(
                "{} returned {} embeddings for {} articles",
                self.model.name(),
                embeddings.len(),
                articles.len()
            )));
        }
        Ok(embeddings)
    }
}
