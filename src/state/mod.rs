//! Orchestration state
//!
//! The transition table (phase × event → phase) and the request-scoped
//! record threaded through one run. Neither performs external calls, so
//! both are testable without any collaborator.

use crate::error::OrchestrationError;
use crate::models::{Intent, Rejection, Row, Verdict};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    Classified,
    Retrieving,
    Generating,
    Validating,
    Executing,
    Rejected,
    Synthesizing,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Classified => "classified",
            Phase::Retrieving => "retrieving",
            Phase::Generating => "generating",
            Phase::Validating => "validating",
            Phase::Executing => "executing",
            Phase::Rejected => "rejected",
            Phase::Synthesizing => "synthesizing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What just happened in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Intent recorded.
    Classified,
    /// Route chosen for the recorded intent.
    Route(Intent),
    /// Context recorded; the intent decides where it flows.
    Retrieved(Intent),
    QueryGenerated,
    Accepted,
    Rejected,
    /// Rejection handed on as an explanation.
    Explained,
    Executed,
    Synthesized,
    /// Unrecoverable external-call error.
    Fault,
}

/// Transition table. `None` means the event is not valid in that phase.
pub fn transition(phase: Phase, event: Event) -> Option<Phase> {
    use Event as E;
    use Phase as P;

    let next = match (phase, event) {
        (P::Start, E::Classified) => P::Classified,

        (P::Classified, E::Route(Intent::Data)) => P::Generating,
        (P::Classified, E::Route(Intent::Regulatory | Intent::Hybrid)) => P::Retrieving,

        (P::Retrieving, E::Retrieved(Intent::Hybrid)) => P::Generating,
        (P::Retrieving, E::Retrieved(Intent::Regulatory)) => P::Synthesizing,

        (P::Generating, E::QueryGenerated) => P::Validating,

        (P::Validating, E::Accepted) => P::Executing,
        (P::Validating, E::Rejected) => P::Rejected,
        (P::Rejected, E::Explained) => P::Synthesizing,

        (P::Executing, E::Executed) => P::Synthesizing,
        (P::Synthesizing, E::Synthesized) => P::Done,

        (p, E::Fault) if !p.is_terminal() => P::Failed,

        _ => return None,
    };
    Some(next)
}

/// Request-scoped record. Every field is write-once.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    question: String,
    intent: Option<Intent>,
    /// `None`: retrieval did not run. `Some(vec![])`: it found nothing.
    context: Option<Vec<String>>,
    access_query: Option<String>,
    verdict: Option<Verdict>,
    rows: Option<Vec<Row>>,
    answer: Option<String>,
}

fn write_once<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<()> {
    if slot.is_some() {
        return Err(OrchestrationError::InternalStateError(format!(
            "{} already set for this request",
            field
        )));
    }
    *slot = Some(value);
    Ok(())
}

impl OrchestrationState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            intent: None,
            context: None,
            access_query: None,
            verdict: None,
            rows: None,
            answer: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn intent(&self) -> Option<Intent> {
        self.intent
    }

    /// Intent, which every phase after `classified` relies on.
    pub fn require_intent(&self) -> Result<Intent> {
        self.intent.ok_or_else(|| {
            OrchestrationError::InternalStateError("intent read before classification".to_string())
        })
    }

    pub fn context(&self) -> Option<&[String]> {
        self.context.as_deref()
    }

    pub fn access_query(&self) -> Option<&str> {
        self.access_query.as_deref()
    }

    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.verdict.as_ref().and_then(Verdict::rejection)
    }

    pub fn rows(&self) -> Option<&[Row]> {
        self.rows.as_deref()
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn set_intent(&mut self, intent: Intent) -> Result<()> {
        write_once(&mut self.intent, intent, "intent")
    }

    pub fn set_context(&mut self, context: Vec<String>) -> Result<()> {
        write_once(&mut self.context, context, "context")
    }

    pub fn set_access_query(&mut self, query: String) -> Result<()> {
        write_once(&mut self.access_query, query, "access-query")
    }

    pub fn set_verdict(&mut self, verdict: Verdict) -> Result<()> {
        write_once(&mut self.verdict, verdict, "verdict")
    }

    pub fn set_rows(&mut self, rows: Vec<Row>) -> Result<()> {
        write_once(&mut self.rows, rows, "rows")
    }

    pub fn set_answer(&mut self, answer: String) -> Result<()> {
        if answer.trim().is_empty() {
            return Err(OrchestrationError::InternalStateError(
                "empty answer produced".to_string(),
            ));
        }
        write_once(&mut self.answer, answer, "answer")
    }

    /// Guard for entering `synthesizing`: there must be something to say.
    pub fn ensure_synthesizable(&self) -> Result<()> {
        if self.context.is_none() && self.rows.is_none() && self.rejection().is_none() {
            return Err(OrchestrationError::InternalStateError(
                "reached synthesizing with no context, rows or rejection".to_string(),
            ));
        }
        Ok(())
    }
}
