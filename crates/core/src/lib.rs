//! CycleCare Core Library
//!
//! Foundational pieces shared by every CycleCare crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingConfig, GenerationConfig, RagConfig};
pub use error::{AppError, AppResult, IndexError, ServiceFailure};
