//! Prompt template with `{context}` and `{question}` placeholders

use sage_core::config::DEFAULT_PROMPT_TEMPLATE;
use sage_core::{Result, SageError};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// A validated prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validate that both placeholders are present
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(SageError::ConfigError(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// Substitute the context block and question
    ///
    /// The context is substituted first and the question is substituted into
    /// the template text only, so placeholder-like text inside retrieved
    /// chunks is left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(idx) = next_placeholder(rest) {
            rendered.push_str(&rest[..idx]);
            let tail = &rest[idx..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                rendered.push_str(question);
                rest = after;
            }
        }
        rendered.push_str(rest);
        rendered
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Byte offset of the earliest placeholder in `text`
fn next_placeholder(text: &str) -> Option<usize> {
    [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER]
        .iter()
        .filter_map(|p| text.find(p))
        .min()
}
