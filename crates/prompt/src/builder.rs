//! Prompt assembly under a character budget.

use crate::template::PromptTemplate;
use crate::types::AssembledPrompt;
use cyclecare_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde::Serialize;

/// Separator placed between passages in the context section.
pub const PASSAGE_DELIMITER: &str = "\n---\n";

#[derive(Serialize)]
struct TemplateVars<'a> {
    context: &'a str,
    question: &'a str,
    language: &'a str,
    tone: &'a str,
    style: &'a str,
}

/// Combine ranked passages and a question into one prompt.
///
/// Passages are joined in the given order with [`PASSAGE_DELIMITER`]. The
/// longest prefix of `passages` whose rendered prompt fits in `budget_chars`
/// characters is kept; lower-ranked passages are dropped whole, never cut.
/// An empty passage list renders a prompt with an empty context section.
///
/// # Errors
/// `AppError::Prompt` when the template and question alone exceed the budget
/// or rendering fails.
///
/// # Example
/// ```
/// use cyclecare_prompt::{assemble, PromptTemplate};
///
/// let template = PromptTemplate::new("demo", "C: {context}\nQ: {question}").unwrap();
/// let prompt = assemble("How long is a cycle?", &["About 28 days."], &template, 200).unwrap();
/// assert_eq!(prompt.text, "C: About 28 days.\nQ: How long is a cycle?");
/// ```
pub fn assemble(
    question: &str,
    passages: &[&str],
    template: &PromptTemplate,
    budget_chars: usize,
) -> AppResult<AssembledPrompt> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string(template.id(), template.source())
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let render = |context: &str| -> AppResult<String> {
        let vars = TemplateVars {
            context,
            question,
            language: template.language(),
            tone: &template.behavior().tone,
            style: &template.behavior().style,
        };
        handlebars
            .render(template.id(), &vars)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
    };

    let mut best = render("")?;
    let mut best_chars = best.chars().count();
    if best_chars > budget_chars {
        return Err(AppError::Prompt(format!(
            "Prompt without context needs {} characters, budget is {}",
            best_chars, budget_chars
        )));
    }

    // Rendered length grows with every added passage, so the first miss ends the search.
    let mut included = 0;
    for n in 1..=passages.len() {
        let candidate = render(&passages[..n].join(PASSAGE_DELIMITER))?;
        let chars = candidate.chars().count();
        if chars > budget_chars {
            break;
        }
        best = candidate;
        best_chars = chars;
        included = n;
    }

    let dropped = passages.len() - included;
    if dropped > 0 {
        tracing::debug!(
            included,
            dropped,
            budget_chars,
            "Dropped lowest-ranked passages to fit the prompt budget"
        );
    }

    Ok(AssembledPrompt {
        text: best,
        included,
        dropped,
        char_count: best_chars,
        template_id: template.id().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_template() -> PromptTemplate {
        PromptTemplate::new("test", "Context:\n{context}\nQuestion: {question}").unwrap()
    }

    #[test]
    fn test_passages_joined_in_order() {
        let prompt = assemble(
            "What is normal?",
            &["first passage", "second passage"],
            &simple_template(),
            1_000,
        )
        .unwrap();

        assert_eq!(
            prompt.text,
            "Context:\nfirst passage\n---\nsecond passage\nQuestion: What is normal?"
        );
        assert_eq!(prompt.included, 2);
        assert_eq!(prompt.dropped, 0);
        assert_eq!(prompt.char_count, prompt.text.chars().count());
    }

    #[test]
    fn test_empty_context_is_valid() {
        let prompt = assemble("Anything?", &[], &simple_template(), 1_000).unwrap();
        assert_eq!(prompt.text, "Context:\n\nQuestion: Anything?");
        assert!(!prompt.has_context());
    }

    #[test]
    fn test_budget_drops_lowest_ranked_first() {
        let passages = ["a".repeat(40), "b".repeat(40), "c".repeat(40)];
        let refs: Vec<&str> = passages.iter().map(String::as_str).collect();
        let template = simple_template();

        let overhead = assemble("q", &[], &template, 1_000).unwrap().char_count;
        let budget = overhead + 40 + PASSAGE_DELIMITER.len() + 40 + 10;

        let prompt = assemble("q", &refs, &template, budget).unwrap();
        assert_eq!(prompt.included, 2);
        assert_eq!(prompt.dropped, 1);
        assert!(prompt.char_count <= budget);
        assert!(prompt.text.contains(&passages[0]));
        assert!(prompt.text.contains(&passages[1]));
        assert!(!prompt.text.contains('c'));
    }

    #[test]
    fn test_passages_never_truncated() {
        let long = "z".repeat(500);
        let prompt = assemble("q", &[long.as_str()], &simple_template(), 100).unwrap();
        assert_eq!(prompt.included, 0);
        assert!(!prompt.text.contains('z'));
    }

    #[test]
    fn test_budget_counts_characters_not_bytes() {
        let passage = "經期平均二十八天";
        let template = simple_template();
        let overhead = assemble("q", &[], &template, 1_000).unwrap().char_count;

        let prompt = assemble("q", &[passage], &template, overhead + 8).unwrap();
        assert_eq!(prompt.included, 1);
        assert_eq!(prompt.char_count, overhead + 8);
    }

    #[test]
    fn test_question_alone_over_budget_fails() {
        let question = "q".repeat(200);
        let result = assemble(&question, &[], &simple_template(), 50);
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_no_html_escaping() {
        let prompt = assemble("Is <5 days short?", &["A & B"], &simple_template(), 1_000).unwrap();
        assert!(prompt.text.contains("A & B"));
        assert!(prompt.text.contains("<5 days"));
    }

    #[test]
    fn test_builtin_template_fills_language() {
        let template = PromptTemplate::builtin().with_language("Traditional Chinese");
        let prompt =
            assemble("Why are my periods irregular?", &["passage"], &template, 20_000).unwrap();
        assert!(prompt.text.contains("Write in Traditional Chinese"));
        assert!(prompt.text.contains("Why are my periods irregular?"));
        assert!(prompt.text.contains("passage"));
    }
}
