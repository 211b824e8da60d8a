//! Query Classifier
//!
//! Maps a user question to one of:
//! - Data: invoice/vendor figures, answered from the database
//! - Regulatory: GST rules, answered from retrieved documents
//! - Hybrid: rules first, then data shaped by those rules
//!
//! The judgment comes from the language model; parsing its label is exact
//! and deterministic. Failures fall back to the configured intent.

use crate::config::ClassifierConfig;
use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::models::Intent;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct QueryClassifier {
    model: Arc<dyn LanguageModel>,
    config: ClassifierConfig,
}

impl QueryClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, config: ClassifierConfig) -> Self {
        Self { model, config }
    }

    /// Classify a question. Makes exactly one model call.
    pub async fn classify(&self, question: &str) -> Result<Intent> {
        let prompt = build_prompt(question);

        let failure = match self.model.classify_text(&prompt).await {
            Ok(label) => match Intent::from_label(&label) {
                Some(intent) => {
                    info!(intent = %intent, "Query classified");
                    return Ok(intent);
                }
                None => format!("unrecognized label '{}'", label.trim()),
            },
            Err(e) => format!("classification call failed: {}", e),
        };

        match self.config.fallback {
            Some(intent) => {
                warn!(reason = %failure, fallback = %intent, "Classification fell back to default intent");
                Ok(intent)
            }
            None => Err(OrchestrationError::ClassificationFailed(failure)),
        }
    }
}

fn build_prompt(question: &str) -> String {
    format!(
        r#"Analyze this user query and classify it into one of three categories:

1. "data" - Purely factual/data questions about invoices, vendors, amounts, etc.
   Examples: "Show me all invoices from Karnataka", "What is the total tax collected?"

2. "regulatory" - Purely regulatory/legal questions about GST rules.
   Examples: "What is Rule 86B?", "Explain input tax credit limits"

3. "hybrid" - Questions that require understanding GST rules AND querying data.
   Examples: "Show invoices violating Rule 86B", "Find transactions exceeding ITC limits"

User Query: {}

Respond with ONLY one word: data, regulatory, or hybrid"#,
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    fn build(model: ScriptedModel, fallback: Option<Intent>) -> (QueryClassifier, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let classifier = QueryClassifier::new(model.clone(), ClassifierConfig { fallback });
        (classifier, model)
    }

    #[tokio::test]
    async fn test_exact_labels() {
        let cases = vec![
            ("data", Intent::Data),
            ("Regulatory", Intent::Regulatory),
            ("  HYBRID \n", Intent::Hybrid),
        ];

        for (label, expected) in cases {
            let (classifier, model) = build(ScriptedModel::new().with_label(label), None);
            assert_eq!(classifier.classify("question").await.unwrap(), expected);
            assert_eq!(model.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_question() {
        let (classifier, model) =
            build(ScriptedModel::new().with_label("data"), Some(Intent::Data));
        classifier.classify("List vendors in Gujarat").await.unwrap();
        let prompts = model.prompts();
        assert!(prompts[0].contains("User Query: List vendors in Gujarat"));
    }

    #[tokio::test]
    async fn test_unknown_label_falls_back() {
        // Substring matches are not accepted
        for label in ["data query", "hybrid.", "I think regulatory", ""] {
            let (classifier, _) =
                build(ScriptedModel::new().with_label(label), Some(Intent::Data));
            assert_eq!(classifier.classify("question").await.unwrap(), Intent::Data);
        }
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let (classifier, _) = build(
            ScriptedModel::new().with_label_error("timeout"),
            Some(Intent::Data),
        );
        assert_eq!(classifier.classify("question").await.unwrap(), Intent::Data);
    }

    #[tokio::test]
    async fn test_without_fallback_surfaces_error() {
        let (classifier, _) =
            build(ScriptedModel::new().with_label_error("timeout"), None);
        let err = classifier.classify("question").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ClassificationFailed(_)));

        let (classifier, _) = build(ScriptedModel::new().with_label("maybe"), None);
        let err = classifier.classify("question").await.unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }
}
