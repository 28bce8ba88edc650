//! Ollama embedding provider.
//!
//! Semantic embeddings from a local Ollama server (e.g. `nomic-embed-text`).
//! Ollama has no batch endpoint, so batches are embedded one text at a time.
//! Failures are surfaced immediately as typed `AppError::Embedding` errors;
//! retry policy belongs to the caller.

use super::{status_error, transport_error};
use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use cyclecare_core::{AppError, AppResult, ServiceFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    /// Model name (e.g., "nomic-embed-text")
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Does not contact the server; the first embedding call reports an
    /// unreachable server or missing model.
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        }
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(status_error("Ollama", status, &message));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::embedding(
                ServiceFailure::Malformed,
                format!("Failed to parse Ollama embedding response: {}", e),
            )
        })?;

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_single(text).await?);
        }
        debug!("Embedded {} texts with Ollama", embeddings.len());
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn is_ollama_running() -> bool {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let url = format!("{}/api/tags", DEFAULT_OLLAMA_URL);
        client.get(&url).send().await.is_ok()
    }

    #[test]
    fn test_names() {
        let provider = OllamaProvider::new("http://localhost:11434/", "nomic-embed-text", 768);
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_request_shape() {
        let request = EmbeddingRequest {
            model: "nomic-embed-text",
            prompt: "cycle length",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "nomic-embed-text", "prompt": "cycle length"})
        );
    }

    #[tokio::test]
    async fn test_unreachable_is_typed() {
        // Port 9 (discard) is reliably closed on test machines.
        let provider = OllamaProvider::new("http://127.0.0.1:9", "nomic-embed-text", 768);
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Embedding {
                kind: ServiceFailure::Unreachable,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_embed_against_local_server() {
        if !is_ollama_running().await {
            println!("Skipping test: Ollama not running");
            return;
        }

        let provider = OllamaProvider::new(DEFAULT_OLLAMA_URL, "nomic-embed-text", 768);
        match provider.embed("Menstrual cycles average 28 days.").await {
            Ok(embedding) => assert!(embedding.iter().any(|&x| x != 0.0)),
            // Server is up but the model is not pulled.
            Err(e) => println!("Skipping test: {}", e),
        }
    }
}
