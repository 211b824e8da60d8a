//! GST Query Orchestrator
//!
//! Answers natural-language questions about GST invoices and rules:
//! - Classifies each question as data, regulatory or hybrid
//! - Retrieves supporting rule passages when the question needs them
//! - Generates a read-only access-query and validates it before execution
//! - Merges rules and rows into one answer with exact figures
//! - Throttles request volume with a process-wide sliding window
//!
//! STATE MACHINE:
//! START → CLASSIFIED → {RETRIEVING, GENERATING} → VALIDATING → {EXECUTING, REJECTED} → SYNTHESIZING → DONE

pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod generator;
pub mod llm;
pub mod models;
pub mod rate_limit;
pub mod retrieval;
pub mod state;
pub mod synthesis;
pub mod validation;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use error::{ErrorKind, OrchestrationError};
pub use models::*;
