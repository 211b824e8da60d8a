//! Language-model boundary
//!
//! Every non-deterministic call the orchestrator makes goes through
//! [`LanguageModel`], so routing and validation stay testable with fixed
//! model outputs.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short label answer (one word expected).
    async fn classify_text(&self, prompt: &str) -> Result<String>;

    /// Free-form generation, used for access-queries and answers.
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Embedding vector for similarity search.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Scripted model for development & testing
///
/// Labels and generations are replayed in order; an exhausted script or a
/// scripted `Err` surfaces as `LlmError`. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedModel {
    labels: Mutex<VecDeque<std::result::Result<String, String>>>,
    generations: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        push(&self.labels, Ok(label.into()));
        self
    }

    pub fn with_label_error(self, message: impl Into<String>) -> Self {
        push(&self.labels, Err(message.into()));
        self
    }

    pub fn with_generation(self, text: impl Into<String>) -> Self {
        push(&self.generations, Ok(text.into()));
        self
    }

    pub fn with_generation_error(self, message: impl Into<String>) -> Self {
        push(&self.generations, Err(message.into()));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
    }
}

fn push(
    queue: &Mutex<VecDeque<std::result::Result<String, String>>>,
    item: std::result::Result<String, String>,
) {
    if let Ok(mut queue) = queue.lock() {
        queue.push_back(item);
    }
}

fn pop(
    queue: &Mutex<VecDeque<std::result::Result<String, String>>>,
    what: &str,
) -> Result<String> {
    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
    match next {
        Some(Ok(text)) => Ok(text),
        Some(Err(message)) => Err(OrchestrationError::LlmError(message)),
        None => Err(OrchestrationError::LlmError(format!(
            "no scripted {} left",
            what
        ))),
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn classify_text(&self, prompt: &str) -> Result<String> {
        self.record(prompt);
        pop(&self.labels, "label")
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.record(prompt);
        pop(&self.generations, "generation")
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.record(text);
        // Deterministic bag-of-bytes vector, enough for similarity tests
        let mut vector = vec![0.0f32; 16];
        for (i, byte) in text.to_lowercase().bytes().enumerate() {
            vector[(byte as usize + i) % 16] += 1.0;
        }
        Ok(vector)
    }
}
