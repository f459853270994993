use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    ///
    /// An empty vector marks an input the provider could not embed.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
