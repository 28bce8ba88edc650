//! Generation provider implementations.

pub mod gemini;
pub mod mock;
pub mod ollama;

pub use gemini::GeminiClient;
pub use mock::MockClient;
pub use ollama::OllamaClient;

use cyclecare_core::{AppError, ServiceFailure};

/// Build a typed generation error from a non-success HTTP response.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    AppError::generation(
        ServiceFailure::from_status(status.as_u16()),
        format!("{} API error ({}): {}", provider, status, body),
    )
}

/// Build a typed generation error from a transport failure.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    AppError::generation(
        ServiceFailure::Unreachable,
        format!("Failed to reach {}: {}", provider, err),
    )
}
