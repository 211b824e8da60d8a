//! Result executor boundary
//!
//! Runs an already validated access-query and returns its rows in order.
//! The orchestrator only ever hands over the validator's canonical text.

use crate::error::OrchestrationError;
use crate::models::Row;
use crate::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

mod postgres;
pub use postgres::PgExecutor;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_read_query(&self, query: &str) -> Result<Vec<Row>>;

    /// Cheap connectivity check for health output.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory executor for development & testing
///
/// Returns the same configured rows for every query and records what it was
/// asked to run.
#[derive(Default)]
pub struct InMemoryExecutor {
    rows: Vec<Row>,
    failure: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Executor whose every call fails with `ExecutionFailed`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Queries executed so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl QueryExecutor for InMemoryExecutor {
    async fn execute_read_query(&self, query: &str) -> Result<Vec<Row>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }

        if let Some(message) = &self.failure {
            return Err(OrchestrationError::ExecutionFailed(message.clone()));
        }

        debug!(row_count = self.rows.len(), "In-memory execution complete");
        Ok(self.rows.clone())
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_records_queries() {
        let executor = InMemoryExecutor::returning(vec![row([("vendor_name", json!("Shree Traders"))])]);

        let rows = executor.execute_read_query("SELECT vendor_name FROM vendors").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["vendor_name"], json!("Shree Traders"));
        assert_eq!(executor.queries(), vec!["SELECT vendor_name FROM vendors".to_string()]);
    }

    #[tokio::test]
    async fn test_in_memory_empty_and_failing() {
        let executor = InMemoryExecutor::new();
        assert!(executor.execute_read_query("SELECT 1").await.unwrap().is_empty());

        let executor = InMemoryExecutor::failing("connection reset");
        let err = executor.execute_read_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ExecutionFailed(_)));
        assert_eq!(executor.call_count(), 1);
    }
}
