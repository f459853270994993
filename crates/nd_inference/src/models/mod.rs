use std::sync::Arc;

use nd_core::config::{EmbeddingConfig, EmbeddingProviderKind};
use nd_core::{EmbeddingProvider, Result};
use tracing::warn;

pub mod hashing;
pub mod openai;

pub use hashing::HashingModel;
pub use openai::OpenAiModel;

/// Builds the configured embedding provider.
pub fn create_model(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingModel::new(config.dimensions)?)),
        EmbeddingProviderKind::Openai => {
            let api_key = std::env::var(&config.api_key_env).ok();
            if api_key.is_none() {
                warn!(env = %config.api_key_env, "no API key set for embedding provider");
            }
            Ok(Arc::new(OpenAiModel::new(&config.base_url, &config.model, api_key)?))
        }
    }
}
