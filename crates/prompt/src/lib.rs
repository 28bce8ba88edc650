//! Prompt system for CycleCare.
//!
//! - YAML prompt definitions under `.cyclecare/prompts/`
//! - Handlebars templates with `{{context}}` and `{{question}}` placeholders
//!   (single-brace `{context}` is accepted and upgraded)
//! - Budgeted assembly that drops the lowest-ranked passages first

pub mod builder;
pub mod loader;
pub mod template;
pub mod types;

// Re-export main types
pub use builder::{assemble, PASSAGE_DELIMITER};
pub use loader::{list_prompts, load_prompt, resolve_template};
pub use template::{normalize_placeholders, PromptTemplate};
pub use types::{AssembledPrompt, PromptBehavior, PromptDefinition};
