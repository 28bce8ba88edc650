//! Embedding provider implementations.

pub mod gemini;
pub mod hashed;
pub mod ollama;

pub use gemini::GeminiProvider;
pub use hashed::HashedProvider;
pub use ollama::OllamaProvider;

use cyclecare_core::{AppError, ServiceFailure};

pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    AppError::embedding(
        ServiceFailure::from_status(status.as_u16()),
        format!("{} embedding API error ({}): {}", provider, status, body),
    )
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    AppError::embedding(
        ServiceFailure::Unreachable,
        format!("Failed to reach {} embedding API: {}", provider, err),
    )
}
