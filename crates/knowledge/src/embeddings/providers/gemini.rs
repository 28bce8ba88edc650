//! Gemini embedding provider (REST `batchEmbedContents`).

use super::{status_error, transport_error};
use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use cyclecare_core::{AppError, AppResult, ServiceFailure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Always `models/<name>`
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        let model = model.into();
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{}", model)
        };
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            dimensions,
        }
    }

    fn to_request(&self, texts: &[String]) -> BatchEmbedRequest {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: self.model.clone(),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model);
        tracing::debug!(
            model = %self.model,
            batch_size = texts.len(),
            "Sending embedding request to Gemini"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.to_request(texts))
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Gemini", status, &body));
        }

        let body: BatchEmbedResponse = response.json().await.map_err(|e| {
            AppError::embedding(
                ServiceFailure::Malformed,
                format!("Failed to parse Gemini embedding response: {}", e),
            )
        })?;

        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_path_normalised() {
        let a = GeminiProvider::new(DEFAULT_GEMINI_URL, "key", "embedding-001", 768);
        let b = GeminiProvider::new(DEFAULT_GEMINI_URL, "key", "models/embedding-001", 768);
        assert_eq!(a.model_name(), "models/embedding-001");
        assert_eq!(b.model_name(), "models/embedding-001");
    }

    #[test]
    fn test_request_shape() {
        let provider = GeminiProvider::new(DEFAULT_GEMINI_URL, "key", "embedding-001", 768);
        let texts = ["one".to_string(), "two".to_string()];
        let json = serde_json::to_value(provider.to_request(&texts)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "requests": [
                    {"model": "models/embedding-001", "content": {"parts": [{"text": "one"}]}},
                    {"model": "models/embedding-001", "content": {"parts": [{"text": "two"}]}}
                ]
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"embeddings": [{"values": [0.1, 0.2]}, {"values": [0.3, 0.4]}]}"#;
        let parsed: BatchEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = GeminiProvider::new(DEFAULT_GEMINI_URL, "secret-key", "embedding-001", 768);
        assert!(!format!("{:?}", provider).contains("secret-key"));
    }

    #[tokio::test]
    async fn test_unreachable_is_typed() {
        let provider = GeminiProvider::new("http://127.0.0.1:9", "key", "embedding-001", 768);
        let err = provider
            .embed_batch(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Embedding {
                kind: ServiceFailure::Unreachable,
                ..
            }
        ));
    }
}
