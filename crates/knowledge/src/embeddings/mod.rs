//! Text embedding.
//!
//! [`EmbeddingProvider`] is the seam for concrete schemes (hashed n-grams,
//! Ollama, Gemini). [`Embedder`] wraps one provider with input validation,
//! the shared external-call limiter and output checks; the rest of the
//! pipeline only talks to an `Embedder`.

pub mod providers;

use crate::limiter::ExternalCallLimiter;
use cyclecare_core::{AppError, AppResult, EmbeddingConfig, ServiceFailure};
use std::sync::Arc;

/// Texts sent per provider call when embedding many chunks.
pub const EMBED_BATCH_SIZE: usize = 32;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g., "hashed", "ollama", "gemini")
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed several texts; the result has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().ok_or_else(|| {
            AppError::embedding(ServiceFailure::Malformed, "No embedding returned")
        })
    }
}

/// Create an embedding provider for the configured scheme.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let dimensions = config.resolved_dimensions();
    let model = config.model_name();

    match config.scheme.as_str() {
        "hashed" => Ok(Arc::new(providers::HashedProvider::new(dimensions))),
        "ollama" => Ok(Arc::new(providers::OllamaProvider::new(
            config
                .endpoint
                .as_deref()
                .unwrap_or(providers::ollama::DEFAULT_OLLAMA_URL),
            model,
            dimensions,
        ))),
        "gemini" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                AppError::Config(format!(
                    "Gemini embeddings need an API key in {}",
                    config.api_key_env
                ))
            })?;
            Ok(Arc::new(providers::GeminiProvider::new(
                config
                    .endpoint
                    .as_deref()
                    .unwrap_or(providers::gemini::DEFAULT_GEMINI_URL),
                api_key,
                model,
                dimensions,
            )))
        }
        other => Err(AppError::Config(format!(
            "Unknown embedding scheme: '{}'. Supported: hashed, ollama, gemini",
            other
        ))),
    }
}

/// Validated, rate-limited access to one embedding scheme.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    limiter: ExternalCallLimiter,
    max_input_chars: usize,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        limiter: ExternalCallLimiter,
        max_input_chars: usize,
    ) -> Self {
        Self {
            provider,
            limiter,
            max_input_chars,
        }
    }

    pub fn from_config(config: &EmbeddingConfig, limiter: ExternalCallLimiter) -> AppResult<Self> {
        config.validate()?;
        let provider = create_provider(config)?;
        tracing::debug!(
            scheme = provider.provider_name(),
            model = provider.model_name(),
            dimensions = provider.dimensions(),
            "Created embedding provider"
        );
        Ok(Self::new(provider, limiter, config.max_input_chars))
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Identifier recorded in the index manifest; vectors are only
    /// comparable between embedders with the same identifier.
    pub fn scheme_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.provider.provider_name(),
            self.provider.model_name(),
            self.provider.dimensions()
        )
    }

    fn check_input(&self, text: &str) -> AppResult<()> {
        if text.trim().is_empty() {
            return Err(AppError::embedding(
                ServiceFailure::Rejected,
                "Cannot embed empty text",
            ));
        }
        let chars = text.chars().count();
        if chars > self.max_input_chars {
            return Err(AppError::embedding(
                ServiceFailure::Rejected,
                format!(
                    "Input of {} characters exceeds the limit of {}",
                    chars, self.max_input_chars
                ),
            ));
        }
        Ok(())
    }

    fn check_output(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimensions() {
            return Err(AppError::embedding(
                ServiceFailure::Malformed,
                format!(
                    "Expected {} dimensions, provider returned {}",
                    self.dimensions(),
                    vector.len()
                ),
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(AppError::embedding(
                ServiceFailure::Malformed,
                "Embedding contains non-finite values",
            ));
        }
        Ok(())
    }

    /// Embed one text. Failures are returned as-is; there is no retry.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.check_input(text)?;
        let vector = self.limiter.run("embed", self.provider.embed(text)).await?;
        self.check_output(&vector)?;
        Ok(vector)
    }

    /// Embed many texts, preserving order.
    pub async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        for text in texts {
            self.check_input(text)?;
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let embedded = self
                .limiter
                .run("embed_batch", self.provider.embed_batch(batch))
                .await?;
            if embedded.len() != batch.len() {
                return Err(AppError::embedding(
                    ServiceFailure::Malformed,
                    format!(
                        "Sent {} texts, received {} embeddings",
                        batch.len(),
                        embedded.len()
                    ),
                ));
            }
            for vector in &embedded {
                self.check_output(vector)?;
            }
            vectors.extend(embedded);
        }

        tracing::debug!(count = vectors.len(), "Embedded batch");
        Ok(vectors)
    }
}
