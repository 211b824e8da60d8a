//! pgvector-backed retriever over the `rule_chunks` table

use super::{format_snippet, ContextRetriever};
use crate::error::OrchestrationError;
use crate::llm::LanguageModel;
use crate::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, error};

pub struct PgVectorRetriever {
    pool: PgPool,
    model: Arc<dyn LanguageModel>,
}

impl PgVectorRetriever {
    pub fn new(pool: PgPool, model: Arc<dyn LanguageModel>) -> Self {
        Self { pool, model }
    }
}

/// pgvector text literal, e.g. `[0.1,0.2]`.
fn vector_literal(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[async_trait]
impl ContextRetriever for PgVectorRetriever {
    async fn embed_and_search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let embedding = self
            .model
            .embed(query)
            .await
            .map_err(|e| OrchestrationError::RetrievalFailed(format!("embedding failed: {}", e)))?;

        let rows = sqlx::query(
            r#"
            SELECT source, content
            FROM rule_chunks
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
        )
        .bind(vector_literal(&embedding))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Vector search failed: {}", e);
            OrchestrationError::RetrievalFailed(format!("vector search failed: {}", e))
        })?;

        let mut snippets = Vec::with_capacity(rows.len());
        for row in rows {
            let source: String = row
                .try_get("source")
                .map_err(|e| OrchestrationError::RetrievalFailed(e.to_string()))?;
            let content: String = row
                .try_get("content")
                .map_err(|e| OrchestrationError::RetrievalFailed(e.to_string()))?;
            snippets.push(format_snippet(&source, &content));
        }

        debug!(top_k, returned = snippets.len(), "Vector retrieval complete");
        Ok(snippets)
    }

    async fn chunk_count(&self) -> Result<Option<u64>> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rule_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to count rule chunks: {}", e))
            })?;
        Ok(Some(count.max(0) as u64))
    }
}
