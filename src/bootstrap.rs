//! Process wiring shared by both binaries
//!
//! Installs tracing and assembles an [`Orchestrator`] from [`AppConfig`].
//! Without a database URL the in-memory collaborators are used: a small set
//! of sample GST rules and an executor that returns no rows.

use crate::agent::Orchestrator;
use crate::classifier::QueryClassifier;
use crate::config::AppConfig;
use crate::error::OrchestrationError;
use crate::execution::{InMemoryExecutor, PgExecutor, QueryExecutor};
use crate::gemini::GeminiClient;
use crate::generator::AccessQueryGenerator;
use crate::llm::LanguageModel;
use crate::rate_limit::RateLimiter;
use crate::retrieval::{ContextRetriever, PgVectorRetriever, StaticRetriever};
use crate::synthesis::AnswerSynthesizer;
use crate::validation::QueryValidator;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    if config.gemini_api_key.is_empty() {
        return Err(OrchestrationError::Configuration(
            "GEMINI_API_KEY is not set (see .env.example)".to_string(),
        ));
    }

    let model: Arc<dyn LanguageModel> = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.embedding_model.clone(),
    )?);

    let (retriever, executor): (Arc<dyn ContextRetriever>, Arc<dyn QueryExecutor>) =
        match &config.database_url {
            Some(url) => {
                let executor = PgExecutor::connect_lazy(url, config.statement_timeout)?;
                let retriever = PgVectorRetriever::new(executor.pool().clone(), model.clone());
                info!("Data backend: postgres + pgvector");
                (Arc::new(retriever), Arc::new(executor))
            }
            None => {
                warn!("DATABASE_URL not set, using sample rules and an empty in-memory executor");
                (
                    Arc::new(StaticRetriever::with_sample_rules()),
                    Arc::new(InMemoryExecutor::new()),
                )
            }
        };

    let orchestrator = Orchestrator::new(
        Arc::new(RateLimiter::new(&config.rate_limit)),
        QueryClassifier::new(model.clone(), config.classifier.clone()),
        retriever,
        AccessQueryGenerator::new(model.clone()),
        QueryValidator::new(&config.validator),
        executor,
        AnswerSynthesizer::new(model),
    )
    .with_settings(config.orchestrator.clone());

    info!(
        model = %config.gemini_model,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window.as_secs(),
        "Orchestrator initialized"
    );
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |key| {
            owned.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let err = build_orchestrator(&config(&[])).err().unwrap();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_in_memory_backend_without_database() {
        let orchestrator = build_orchestrator(&config(&[("GEMINI_API_KEY", "test-key")])).unwrap();
        assert_eq!(orchestrator.retriever().chunk_count().await.unwrap(), Some(3));
        assert!(orchestrator.executor().ping().await.is_ok());
    }
}
