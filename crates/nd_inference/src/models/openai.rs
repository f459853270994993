use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use nd_core::{EmbeddingProvider, Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiModel {
    client: Arc<Client>,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client: Arc::new(client),
            api_key: api_key.unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

impl fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Orders response rows by `index`. Inputs the server skipped stay empty.
fn into_ordered(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut out = vec![Vec::new(); expected];
    for row in response.data {
        let slot = out
            .get_mut(row.index)
            .ok_or_else(|| Error::Inference(format!("embedding index {} out of range", row.index)))?;
        *slot = row.embedding;
    }
    Ok(out)
}

#[async_trait]
impl EmbeddingProvider for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Inference(format!("embedding request failed: {}", e)))?
            .json::<EmbeddingResponse>()
            .await?;

        into_ordered(response, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_ordered() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data": [
                {"index": 2, "embedding": [0.3]},
                {"index": 0, "embedding": [0.1]}
            ]}"#,
        )
        .unwrap();
        let ordered = into_ordered(response, 3).unwrap();
        assert_eq!(ordered, vec![vec![0.1], vec![], vec![0.3]]);
    }

    #[test]
    fn test_into_ordered_rejects_bad_index() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 5, "embedding": [0.1]}]}"#).unwrap();
        assert!(into_ordered(response, 1).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let model = OpenAiModel::new("https://api.example.com/v1/", "m", Some("secret".into())).unwrap();
        let debug = format!("{:?}", model);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("https://api.example.com/v1\""));
    }
}
