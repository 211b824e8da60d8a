//! Error types for the GST query orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::Phase;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Request Outcomes
    // =============================

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Access-query generation failed: {0}")]
    GenerationFailed(String),

    #[error("Access-query execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Internal state error: {0}")]
    InternalStateError(String),

    #[error("Request cancelled while {0}")]
    Cancelled(Phase),

    #[error("Request deadline exceeded while {0}")]
    DeadlineExceeded(Phase),

    // =============================
    // Adapter Errors
    // =============================

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Caller-facing error category.
///
/// Front ends switch on this rather than on the error message so they can
/// tell "try again later" apart from "the system is down".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    ClassificationFailed,
    RetrievalFailed,
    GenerationFailed,
    ExecutionFailed,
    InternalStateError,
    Cancelled,
    DeadlineExceeded,
    Configuration,
    Upstream,
}

impl ErrorKind {
    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::DeadlineExceeded
                | ErrorKind::RetrievalFailed
                | ErrorKind::GenerationFailed
                | ErrorKind::ExecutionFailed
                | ErrorKind::ClassificationFailed
                | ErrorKind::Upstream
        )
    }
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::RateLimited(_) => ErrorKind::RateLimited,
            OrchestrationError::ClassificationFailed(_) => ErrorKind::ClassificationFailed,
            OrchestrationError::RetrievalFailed(_) => ErrorKind::RetrievalFailed,
            OrchestrationError::GenerationFailed(_) => ErrorKind::GenerationFailed,
            OrchestrationError::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            OrchestrationError::InternalStateError(_) => ErrorKind::InternalStateError,
            OrchestrationError::Cancelled(_) => ErrorKind::Cancelled,
            OrchestrationError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            OrchestrationError::Configuration(_) => ErrorKind::Configuration,
            OrchestrationError::LlmError(_)
            | OrchestrationError::DatabaseError(_)
            | OrchestrationError::SerializationError(_)
            | OrchestrationError::HttpError(_) => ErrorKind::Upstream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = OrchestrationError::RateLimited("60 requests per 60s".into());
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.kind().is_retryable());

        let err = OrchestrationError::InternalStateError("bad transition".into());
        assert_eq!(err.kind(), ErrorKind::InternalStateError);
        assert!(!err.kind().is_retryable());

        let err = OrchestrationError::DeadlineExceeded(Phase::Executing);
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert!(err.to_string().contains("executing"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ExecutionFailed).unwrap();
        assert_eq!(json, "\"execution_failed\"");
    }
}
