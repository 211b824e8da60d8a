//! Access-query generator
//!
//! Turns a question (plus optional retrieved context) into one SQL read
//! query using the language model. Deliberately performs no validation:
//! the output goes to the validator exactly as the model wrote it, minus a
//! surrounding markdown fence.

use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, error};

pub mod prompt;
pub use prompt::build_generation_prompt;

pub struct AccessQueryGenerator {
    model: Arc<dyn LanguageModel>,
}

impl AccessQueryGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Generate an access-query. A failed model call is a `GenerationFailed`;
    /// no retry happens here.
    pub async fn generate(&self, question: &str, context: &[String]) -> Result<String> {
        let prompt = build_generation_prompt(question, context);

        let raw = self.model.generate_text(&prompt).await.map_err(|e| {
            error!("Failed to generate access-query: {}", e);
            OrchestrationError::GenerationFailed(e.to_string())
        })?;

        let query = unwrap_code_fence(&raw);
        debug!(query = %query, context_snippets = context.len(), "Access-query generated");
        Ok(query)
    }
}

/// Strip one surrounding markdown code fence, if present.
fn unwrap_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    // Drop the info string (e.g. "sql") on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    #[test]
    fn test_unwrap_code_fence() {
        assert_eq!(unwrap_code_fence("SELECT 1"), "SELECT 1");
        assert_eq!(unwrap_code_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(unwrap_code_fence("```\nSELECT *\nFROM vendors\n```\n"), "SELECT *\nFROM vendors");
        assert_eq!(unwrap_code_fence("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_fence_unwrapping_keeps_statements_intact() {
        // Terminators and comments are the validator's business
        let raw = "```sql\nSELECT 1; DROP TABLE invoices -- bye\n```";
        assert_eq!(unwrap_code_fence(raw), "SELECT 1; DROP TABLE invoices -- bye");
    }

    #[tokio::test]
    async fn test_generate_uses_context() {
        let model = Arc::new(ScriptedModel::new().with_generation(
            "```sql\nSELECT to_char(invoice_date, 'YYYY-MM') AS month FROM invoices\n```",
        ));
        let generator = AccessQueryGenerator::new(model.clone());

        let context = vec!["[Source: rule86b.txt]\nRule 86B text".to_string()];
        let query = generator
            .generate("Show invoices violating Rule 86B", &context)
            .await
            .unwrap();

        assert_eq!(
            query,
            "SELECT to_char(invoice_date, 'YYYY-MM') AS month FROM invoices"
        );
        assert!(model.prompts()[0].contains("Rule 86B text"));
    }

    #[tokio::test]
    async fn test_generation_failure() {
        let model = Arc::new(ScriptedModel::new().with_generation_error("503"));
        let generator = AccessQueryGenerator::new(model);
        let err = generator.generate("List vendors", &[]).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::GenerationFailed(_)));
    }
}
