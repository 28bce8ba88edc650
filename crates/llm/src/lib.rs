//! Generation provider crate for CycleCare.
//!
//! A provider-agnostic [`LlmClient`] trait with three implementations:
//! - **Ollama**: local runtime (default)
//! - **Gemini**: Google Generative Language REST API
//! - **Mock**: scripted, in-process, for offline runs and tests
//!
//! # Example
//! ```no_run
//! use cyclecare_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("What is a normal cycle length?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, MockClient, OllamaClient};
pub use types::ProviderType;
