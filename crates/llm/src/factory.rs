//! LLM provider factory.

use crate::client::LlmClient;
use crate::providers::{GeminiClient, MockClient, OllamaClient};
use crate::types::ProviderType;
use cyclecare_core::{AppError, AppResult};
use std::sync::Arc;

/// Reply used by the `mock` provider when selected through configuration.
const MOCK_REPLY: &str =
    "This is an offline mock answer. Configure a real provider for medical guidance.";

/// Create an LLM client for the named provider.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "gemini", "mock")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key, required by Gemini
///
/// # Errors
/// `AppError::Config` when the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let client: Arc<dyn LlmClient> = match provider_type {
        ProviderType::Ollama => Arc::new(OllamaClient::with_base_url(
            endpoint.unwrap_or(crate::providers::ollama::DEFAULT_OLLAMA_URL),
        )),
        ProviderType::Gemini => {
            let key = api_key.filter(|key| !key.trim().is_empty()).ok_or_else(|| {
                AppError::Config("Gemini provider requires API key".to_string())
            })?;
            Arc::new(GeminiClient::with_base_url(
                endpoint.unwrap_or(crate::providers::gemini::DEFAULT_GEMINI_URL),
                key,
            ))
        }
        ProviderType::Mock => Arc::new(MockClient::new(MOCK_REPLY)),
    };

    tracing::debug!(provider = provider_type.as_str(), "Created LLM client");
    Ok(client)
}
