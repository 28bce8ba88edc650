//! Prompt types for CycleCare.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    #[serde(default)]
    pub behavior: PromptBehavior,

    /// Language the answer should be written in; overrides configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Template with `{{context}}` and `{{question}}` placeholders
    pub template: String,
}

/// Behavioral hints exposed to the template as `{{tone}}` and `{{style}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBehavior {
    pub tone: String,
    pub style: String,
}

impl Default for PromptBehavior {
    fn default() -> Self {
        Self {
            tone: "warm and professional".to_string(),
            style: "structured".to_string(),
        }
    }
}

/// A fully assembled prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledPrompt {
    /// Rendered prompt text
    pub text: String,

    /// Number of leading passages that made it into the context
    pub included: usize,

    /// Number of trailing passages dropped to respect the budget
    pub dropped: usize,

    /// Length of `text` in characters
    pub char_count: usize,

    /// Source template identifier
    pub template_id: String,
}

impl AssembledPrompt {
    pub fn has_context(&self) -> bool {
        self.included > 0
    }
}
