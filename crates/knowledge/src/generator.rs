//! Prompt → answer text via the configured generation provider.

use crate::limiter::ExternalCallLimiter;
use cyclecare_core::{AppError, AppResult, ServiceFailure};
use cyclecare_llm::{LlmClient, LlmRequest};
use std::sync::Arc;
use std::time::Duration;

/// Pause before the single retry of a transient failure.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Calls the generation model under the shared limiter.
///
/// A transient failure (unreachable, rate limited, timed out) is retried once
/// after a short backoff; anything else is returned immediately.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    max_output_tokens: u32,
    limiter: ExternalCallLimiter,
    retry_backoff: Duration,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Generator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        max_output_tokens: u32,
        limiter: ExternalCallLimiter,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            max_output_tokens,
            limiter,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(
        skip(self, prompt),
        fields(
            provider = self.client.provider_name(),
            model = %self.model,
            prompt_chars = prompt.len()
        )
    )]
    pub async fn generate(&self, prompt: &str, temperature: f32) -> AppResult<String> {
        let request = LlmRequest::new(prompt, self.model.as_str())
            .with_temperature(temperature)
            .with_max_tokens(self.max_output_tokens);

        match self.attempt(&request).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Generation failed ({}), retrying once in {}ms",
                    e,
                    self.retry_backoff.as_millis()
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.attempt(&request).await
            }
            result => result,
        }
    }

    async fn attempt(&self, request: &LlmRequest) -> AppResult<String> {
        let response = self
            .limiter
            .run("generate", self.client.complete(request))
            .await?;

        if response.content.trim().is_empty() {
            return Err(AppError::generation(
                ServiceFailure::Malformed,
                "Model returned an empty answer",
            ));
        }
        if !response.done {
            tracing::warn!("Answer was cut off at the output token limit");
        }
        tracing::debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Generation finished"
        );
        Ok(response.content)
    }

    /// Whether the provider answers and accepts our credentials.
    pub async fn health_check(&self) -> AppResult<()> {
        self.limiter
            .run("health_check", self.client.health_check())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclecare_llm::MockClient;

    fn generator(client: Arc<MockClient>, timeout: Duration) -> Generator {
        Generator::new(client, "mock-model", 256, ExternalCallLimiter::new(2, timeout))
            .with_retry_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_returns_model_text() {
        let client = Arc::new(MockClient::new("Cycles usually last 21 to 35 days."));
        let answer = generator(client.clone(), Duration::from_secs(5))
            .generate("prompt", 0.3)
            .await
            .unwrap();
        assert_eq!(answer, "Cycles usually last 21 to 35 days.");
        assert_eq!(client.calls(), 1);
        assert_eq!(client.last_prompt().as_deref(), Some("prompt"));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let client = Arc::new(MockClient::new("ok").fail_with(ServiceFailure::RateLimited));
        let answer = generator(client.clone(), Duration::from_secs(5))
            .generate("prompt", 0.3)
            .await
            .unwrap();
        assert_eq!(answer, "ok");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_transient_failure() {
        let client = Arc::new(
            MockClient::new("ok")
                .fail_with(ServiceFailure::Unreachable)
                .fail_with(ServiceFailure::Unreachable),
        );
        let result = generator(client.clone(), Duration::from_secs(5))
            .generate("prompt", 0.3)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Generation {
                kind: ServiceFailure::Unreachable,
                ..
            })
        ));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let client = Arc::new(MockClient::new("ok").fail_with(ServiceFailure::Unauthorized));
        let result = generator(client.clone(), Duration::from_secs(5))
            .generate("prompt", 0.3)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Generation {
                kind: ServiceFailure::Unauthorized,
                ..
            })
        ));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let client = Arc::new(MockClient::new("late").with_delay(Duration::from_secs(5)));
        let result = generator(client.clone(), Duration::from_millis(20))
            .generate("prompt", 0.3)
            .await;
        assert!(matches!(result, Err(AppError::Timeout { .. })));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_is_malformed() {
        let client = Arc::new(MockClient::new("   "));
        let result = generator(client, Duration::from_secs(5))
            .generate("prompt", 0.3)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Generation {
                kind: ServiceFailure::Malformed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_health_check() {
        let healthy = generator(Arc::new(MockClient::new("ok")), Duration::from_secs(1));
        assert!(healthy.health_check().await.is_ok());

        let unhealthy = generator(
            Arc::new(MockClient::new("ok").unhealthy()),
            Duration::from_secs(1),
        );
        assert!(unhealthy.health_check().await.is_err());
    }
}
