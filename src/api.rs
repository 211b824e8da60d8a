//! REST API Server for the GST query orchestrator
//!
//! Exposes `handle_query` over HTTP for dashboards and other front ends.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::{ErrorKind, OrchestrationError};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub question: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            error_kind: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String, kind: Option<ErrorKind>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            error_kind: kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::ClassificationFailed
        | ErrorKind::RetrievalFailed
        | ErrorKind::GenerationFailed
        | ErrorKind::ExecutionFailed
        | ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::InternalStateError | ErrorKind::Configuration => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let database = match state.orchestrator.executor().ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("unavailable: {}", e),
    };
    let rule_chunks = state
        .orchestrator
        .retriever()
        .chunk_count()
        .await
        .ok()
        .flatten();

    Json(serde_json::json!({
        "status": "healthy",
        "database": database,
        "rule_chunks": rule_chunks,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn query_handler(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let question = req.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("question must not be empty".into(), None)),
        );
    }

    info!("Received query: {}", question);

    match state.orchestrator.handle_query(question).await {
        Ok(answer) => (StatusCode::OK, Json(ApiResponse::success(answer))),
        Err(e) => error_response(e),
    }
}

fn error_response(e: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    let kind = e.kind();
    warn!(kind = ?kind, "Query failed: {}", e);
    (
        status_for(kind),
        Json(ApiResponse::error(e.to_string(), Some(kind))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::QueryClassifier;
    use crate::config::{ClassifierConfig, RateLimitConfig, ValidatorConfig};
    use crate::execution::{row, InMemoryExecutor};
    use crate::generator::AccessQueryGenerator;
    use crate::llm::ScriptedModel;
    use crate::rate_limit::RateLimiter;
    use crate::retrieval::StaticRetriever;
    use crate::state::Phase;
    use crate::synthesis::AnswerSynthesizer;
    use crate::validation::QueryValidator;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(model: ScriptedModel, max_requests: usize) -> Router {
        let model = Arc::new(model);
        let limiter = RateLimiter::new(&RateLimitConfig {
            window: Duration::from_secs(60),
            max_requests,
        });
        let executor = InMemoryExecutor::returning(vec![row([
            ("vendor_name", json!("Shree Traders")),
            ("gstin", json!("24AAACS1234F1Z5")),
        ])]);

        let orchestrator = Orchestrator::new(
            Arc::new(limiter),
            QueryClassifier::new(model.clone(), ClassifierConfig::default()),
            Arc::new(StaticRetriever::with_sample_rules()),
            AccessQueryGenerator::new(model.clone()),
            QueryValidator::new(&ValidatorConfig::default()),
            Arc::new(executor),
            AnswerSynthesizer::new(model),
        );
        create_router(Arc::new(orchestrator))
    }

    async fn post_query(router: Router, question: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "question": question }).to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_blank_question_is_bad_request() {
        let model = ScriptedModel::new();
        let (status, body) = post_query(router(model, 5), "   ").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_kind"], Value::Null);
    }

    #[tokio::test]
    async fn test_query_success_envelope() {
        let model = ScriptedModel::new()
            .with_label("data")
            .with_generation("SELECT vendor_name, gstin FROM vendors WHERE state = 'Gujarat'");
        let (status, body) = post_query(router(model, 5), "List vendors in Gujarat").await;

        assert_eq!(status, StatusCode::OK);
        let envelope = body.as_object().unwrap();
        for field in ["success", "data", "error", "error_kind", "timestamp"] {
            assert!(envelope.contains_key(field), "missing {}", field);
        }
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["error"], Value::Null);
        assert_eq!(body["data"]["intent"], json!("data"));
        assert_eq!(body["data"]["row_count"], json!(1));
        assert!(body["data"]["answer"]
            .as_str()
            .unwrap()
            .contains("Shree Traders"));
    }

    #[tokio::test]
    async fn test_over_limit_request_is_429() {
        let model = ScriptedModel::new()
            .with_label("regulatory")
            .with_label("regulatory");
        let router = router(model, 2);

        for question in ["What is Rule 86B?", "What is IGST?"] {
            let (status, _) = post_query(router.clone(), question).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = post_query(router, "What is reverse charge?").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_kind"], json!("rate_limited"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorKind::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::Cancelled), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status_for(ErrorKind::ExecutionFailed), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(ErrorKind::InternalStateError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_envelope() {
        let (status, Json(body)) =
            error_response(OrchestrationError::DeadlineExceeded(Phase::Executing));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(!body.success);
        assert_eq!(body.error_kind, Some(ErrorKind::DeadlineExceeded));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error_kind"], "deadline_exceeded");
    }
}
