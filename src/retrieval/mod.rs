//! Context retrieval boundary
//!
//! The orchestrator asks for the `top_k` passages most similar to a
//! question and receives them already formatted as
//! `[Source: <file>]\n<chunk>`, most relevant first.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

mod pgvector;
pub use pgvector::PgVectorRetriever;

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn embed_and_search(&self, query: &str, top_k: usize) -> Result<Vec<String>>;

    /// Number of stored chunks, for health output. `None` when unknown.
    async fn chunk_count(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// One stored passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleChunk {
    pub source: String,
    pub content: String,
}

impl RuleChunk {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }

    pub fn to_snippet(&self) -> String {
        format_snippet(&self.source, &self.content)
    }
}

pub fn format_snippet(source: &str, content: &str) -> String {
    format!("[Source: {}]\n{}", source, content)
}

/// In-memory retriever for development & testing
///
/// Ranks chunks by how many distinct question words they share, ties kept
/// in insertion order. Records every query it receives.
#[derive(Default)]
pub struct StaticRetriever {
    chunks: Vec<RuleChunk>,
    failure: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<RuleChunk>) -> Self {
        Self {
            chunks,
            ..Self::default()
        }
    }

    /// Retriever whose every search fails with `RetrievalFailed`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// A few GST rule passages, enough to run the shell without a vector store.
    pub fn with_sample_rules() -> Self {
        Self::new(vec![
            RuleChunk::new(
                "rule_86b.txt",
                "Rule 86B: The registered person shall not use the amount available in the \
                 electronic credit ledger for discharging his liability towards output tax in \
                 excess of ninety-nine per cent of such tax liability, in cases where the value \
                 of taxable supply other than exempt supply and zero-rated supply, in a month \
                 exceeds fifty lakh rupees.",
            ),
            RuleChunk::new(
                "igst_basics.txt",
                "Integrated GST (IGST) is levied on inter-state supplies, where the location \
                 of the supplier and the place of supply are in different states. Intra-state \
                 supplies attract CGST and SGST in equal halves.",
            ),
            RuleChunk::new(
                "reverse_charge.txt",
                "Under reverse charge, the recipient of goods or services is liable to pay the \
                 tax instead of the supplier, for notified categories of supply.",
            ),
        ])
    }

    /// Queries received so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().map(|q| q.len()).unwrap_or(0)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(|w| w.to_lowercase())
        .collect()
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn embed_and_search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }

        if let Some(message) = &self.failure {
            return Err(OrchestrationError::RetrievalFailed(message.clone()));
        }

        let wanted = terms(query);
        let mut scored: Vec<(usize, &RuleChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (terms(&chunk.content).intersection(&wanted).count(), chunk))
            .collect();
        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let snippets: Vec<String> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, chunk)| chunk.to_snippet())
            .collect();

        debug!(top_k, returned = snippets.len(), "Static retrieval complete");
        Ok(snippets)
    }

    async fn chunk_count(&self) -> Result<Option<u64>> {
        Ok(Some(self.chunks.len() as u64))
    }
}
