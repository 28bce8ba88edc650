//! Prompt templates and placeholder handling.

use cyclecare_core::{AppError, AppResult};
use handlebars::Handlebars;

use crate::types::{PromptBehavior, PromptDefinition};

/// Placeholders every template must reference.
pub const REQUIRED_PLACEHOLDERS: [&str; 2] = ["context", "question"];

/// Placeholders upgraded from `{name}` to `{{name}}`.
const KNOWN_PLACEHOLDERS: [&str; 5] = ["context", "question", "language", "tone", "style"];

pub const BUILTIN_TEMPLATE_ID: &str = "care.advisor.default";

const BUILTIN_TEMPLATE: &str = "\
You are a women's health advisor with gynecological knowledge, experienced in giving \
adolescents and adults practical guidance about menstruation and related health topics.

Task: using the knowledge passages (context) and the user's question, give accurate, \
empathetic and specific advice.

Structure your answer as follows:

1. Advice
- Weave the information from the context directly into the answer.
- If the context does not cover the question, you may offer a reasoned inference from \
general medical knowledge, but label it clearly as an inference and keep it brief and objective.
- Mix short paragraphs and bullet points for readability.
2. Points to watch
3. Whether to see a doctor or seek further help
4. Sources: close with a short note naming the passages the answer drew on.

Rules:
1. Write in {{language}} with a clear, {{tone}} tone that is never cold.
2. Keep the answer {{style}}, using bullets or paragraphs.
3. If the information is uncertain or the context is empty, say that there is \
insufficient information to answer reliably and recommend consulting a qualified doctor.
4. Prefer the context over general knowledge and say where the information came from.
5. Never fabricate content, and do not answer questions unrelated to menstruation or women's health.
6. Where nearby clinic information is available, suggest clinics suitable for women's health and menstrual concerns.
7. Discuss sensitive topics gently and respectfully, giving accurate, evidence-based guidance.

Knowledge passages:
{{context}}

User question:
{{question}}

Answer according to the rules above.
";

/// A validated template in Handlebars form.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    id: String,
    source: String,
    language: String,
    behavior: PromptBehavior,
}

impl PromptTemplate {
    /// Create a template from raw text.
    ///
    /// Single-brace placeholders (`{context}`) are accepted and upgraded.
    /// Fails with `AppError::Prompt` if a required placeholder is missing or
    /// the text is not a valid Handlebars template.
    pub fn new(id: impl Into<String>, raw: &str) -> AppResult<Self> {
        let id = id.into();
        let source = normalize_placeholders(raw);

        for name in REQUIRED_PLACEHOLDERS {
            if !references(&source, name) {
                return Err(AppError::Prompt(format!(
                    "Template '{}' is missing the {{{{{}}}}} placeholder",
                    id, name
                )));
            }
        }

        let mut handlebars = Handlebars::new();
        handlebars
            .register_template_string(&id, &source)
            .map_err(|e| AppError::Prompt(format!("Invalid template '{}': {}", id, e)))?;

        Ok(Self {
            id,
            source,
            language: "English".to_string(),
            behavior: PromptBehavior::default(),
        })
    }

    /// The women's-health advisor template shipped with CycleCare.
    pub fn builtin() -> Self {
        Self {
            id: BUILTIN_TEMPLATE_ID.to_string(),
            source: BUILTIN_TEMPLATE.to_string(),
            language: "English".to_string(),
            behavior: PromptBehavior::default(),
        }
    }

    pub fn from_definition(definition: &PromptDefinition) -> AppResult<Self> {
        let mut template = Self::new(definition.id.clone(), &definition.template)?;
        template.behavior = definition.behavior.clone();
        if let Some(language) = &definition.language {
            template.language = language.clone();
        }
        Ok(template)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn behavior(&self) -> &PromptBehavior {
        &self.behavior
    }
}

/// Upgrade `{name}` placeholders to `{{name}}`, leaving existing
/// double-brace placeholders untouched.
pub fn normalize_placeholders(raw: &str) -> String {
    let mut out = raw.to_string();
    for name in KNOWN_PLACEHOLDERS {
        let double = format!("{{{{{}}}}}", name);
        let single = format!("{{{}}}", name);
        let marker = format!("\u{0}{}\u{0}", name);
        out = out
            .replace(&double, &marker)
            .replace(&single, &double)
            .replace(&marker, &double);
    }
    out
}

fn references(source: &str, name: &str) -> bool {
    source.contains(&format!("{{{{{}}}}}", name))
        || source.contains(&format!("{{{{ {} }}}}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_single_braces() {
        let normalized = normalize_placeholders("Context:\n{context}\nQ: {question}");
        assert_eq!(normalized, "Context:\n{{context}}\nQ: {{question}}");
    }

    #[test]
    fn test_normalize_keeps_double_braces() {
        let raw = "{{context}} and {question}";
        assert_eq!(normalize_placeholders(raw), "{{context}} and {{question}}");
    }

    #[test]
    fn test_unknown_single_brace_left_alone() {
        let raw = "{context} {question} {\"json\": true}";
        assert!(normalize_placeholders(raw).ends_with("{\"json\": true}"));
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let err = PromptTemplate::new("broken", "Only {question} here").unwrap_err();
        assert!(err.to_string().contains("context"));
    }

    #[test]
    fn test_invalid_handlebars_rejected() {
        let result = PromptTemplate::new("bad", "{{context}} {{question}} {{#if}}");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_builtin_is_valid() {
        let builtin = PromptTemplate::builtin();
        let reparsed = PromptTemplate::new("copy", builtin.source()).unwrap();
        assert_eq!(reparsed.source(), builtin.source());
    }
}
