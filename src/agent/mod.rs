//! Main orchestrator - drives one question through the state machine
//!
//! ADMIT → CLASSIFY → (RETRIEVE) → (GENERATE → VALIDATE → EXECUTE | REJECT) → SYNTHESIZE
//!
//! Steps run strictly in sequence. Every external call is raced against the
//! caller's cancellation token and the request deadline; whichever fires
//! first drops the pending call. No step is retried here.

use crate::classifier::QueryClassifier;
use crate::config::OrchestratorSettings;
use crate::error::OrchestrationError;
use crate::execution::QueryExecutor;
use crate::generator::AccessQueryGenerator;
use crate::models::{ComplianceFlags, QueryAnswer, Verdict};
use crate::rate_limit::RateLimiter;
use crate::retrieval::ContextRetriever;
use crate::state::{transition, Event, OrchestrationState, Phase};
use crate::synthesis::{AnswerSynthesizer, Evidence};
use crate::validation::QueryValidator;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-request bookkeeping, dropped when the request ends.
struct Run {
    state: OrchestrationState,
    flags: ComplianceFlags,
    trace: Vec<String>,
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
}

/// Main orchestrator that coordinates the entire workflow
pub struct Orchestrator {
    rate_limiter: Arc<RateLimiter>,
    classifier: QueryClassifier,
    retriever: Arc<dyn ContextRetriever>,
    generator: AccessQueryGenerator,
    validator: QueryValidator,
    executor: Arc<dyn QueryExecutor>,
    synthesizer: AnswerSynthesizer,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        classifier: QueryClassifier,
        retriever: Arc<dyn ContextRetriever>,
        generator: AccessQueryGenerator,
        validator: QueryValidator,
        executor: Arc<dyn QueryExecutor>,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            rate_limiter,
            classifier,
            retriever,
            generator,
            validator,
            executor,
            synthesizer,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn retriever(&self) -> &Arc<dyn ContextRetriever> {
        &self.retriever
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    /// Answer one question.
    pub async fn handle_query(&self, question: &str) -> Result<QueryAnswer> {
        self.handle_query_with_cancellation(question, CancellationToken::new())
            .await
    }

    /// Answer one question, abandoning the pending external call as soon as
    /// `cancel` fires or the configured deadline passes.
    pub async fn handle_query_with_cancellation(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<QueryAnswer> {
        if !self.rate_limiter.admit() {
            warn!(
                max_requests = self.rate_limiter.max_requests(),
                window_secs = self.rate_limiter.window().as_secs(),
                "Request denied by rate limiter"
            );
            return Err(OrchestrationError::RateLimited(format!(
                "at most {} requests per {}s, try again later",
                self.rate_limiter.max_requests(),
                self.rate_limiter.window().as_secs()
            )));
        }

        let request_id = Uuid::new_v4();
        let span = info_span!("handle_query", %request_id);
        self.run(request_id, question, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request_id: Uuid,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<QueryAnswer> {
        let started = Instant::now();
        info!(question = %question, "Orchestrator: request admitted");

        let mut run = Run {
            state: OrchestrationState::new(question),
            flags: ComplianceFlags::default(),
            trace: Vec::new(),
            cancel,
            deadline: self
                .settings
                .request_deadline
                .map(|d| tokio::time::Instant::now() + d),
        };
        let mut phase = Phase::Start;

        while !phase.is_terminal() {
            let event = match self.step(phase, &mut run).await {
                Ok(event) => event,
                Err(e) => {
                    let failed = transition(phase, Event::Fault).unwrap_or(Phase::Failed);
                    error!(
                        phase = %phase,
                        to = %failed,
                        kind = ?e.kind(),
                        error = %e,
                        "Request failed"
                    );
                    return Err(e);
                }
            };

            let next = transition(phase, event).ok_or_else(|| {
                OrchestrationError::InternalStateError(format!(
                    "no transition from {} on {:?}",
                    phase, event
                ))
            })?;

            debug!(from = %phase, to = %next, ?event, "Phase transition");
            phase = next;
        }

        let state = run.state;
        let answer = state
            .answer()
            .ok_or_else(|| {
                OrchestrationError::InternalStateError("finished without an answer".to_string())
            })?
            .to_string();
        let intent = state.require_intent()?;
        let row_count = state.rows().map_or(0, |r| r.len());
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            intent = %intent,
            row_count,
            rejected = state.rejection().is_some(),
            elapsed_ms,
            "Request answered"
        );

        Ok(QueryAnswer {
            request_id,
            question: state.question().to_string(),
            intent,
            answer,
            access_query: state.access_query().map(String::from),
            verdict: state.verdict().cloned(),
            row_count,
            context_snippets: state.context().map_or(0, |c| c.len()),
            compliance_flags: run.flags,
            trace: run.trace,
            elapsed_ms,
        })
    }

    /// Perform the work of `phase` and report what happened.
    async fn step(&self, phase: Phase, run: &mut Run) -> Result<Event> {
        let (event, note) = match phase {
            Phase::Start => {
                let intent = guarded(
                    phase,
                    &run.cancel,
                    run.deadline,
                    OrchestrationError::ClassificationFailed,
                    self.classifier.classify(run.state.question()),
                )
                .await?;
                run.state.set_intent(intent)?;
                (Event::Classified, format!("intent={}", intent))
            }

            Phase::Classified => {
                let intent = run.state.require_intent()?;
                (Event::Route(intent), format!("route for {}", intent))
            }

            Phase::Retrieving => {
                let intent = run.state.require_intent()?;
                let context = guarded(
                    phase,
                    &run.cancel,
                    run.deadline,
                    OrchestrationError::RetrievalFailed,
                    self.retriever
                        .embed_and_search(run.state.question(), self.settings.retrieval_top_k),
                )
                .await?;
                let note = format!("{} snippet(s)", context.len());
                run.state.set_context(context)?;
                (Event::Retrieved(intent), note)
            }

            Phase::Generating => {
                let query = guarded(
                    phase,
                    &run.cancel,
                    run.deadline,
                    OrchestrationError::GenerationFailed,
                    self.generator
                        .generate(run.state.question(), run.state.context().unwrap_or(&[])),
                )
                .await?;
                run.state.set_access_query(query)?;
                (Event::QueryGenerated, "access-query drafted".to_string())
            }

            Phase::Validating => {
                let query = run.state.access_query().ok_or_else(|| {
                    OrchestrationError::InternalStateError("validating without a query".to_string())
                })?;
                let verdict = self.validator.validate(query);
                let (event, note) = match &verdict {
                    Verdict::Accepted { .. } => (Event::Accepted, "accepted".to_string()),
                    Verdict::Rejected(r) => (Event::Rejected, format!("rejected: {}", r.kind)),
                };
                run.state.set_verdict(verdict)?;
                (event, note)
            }

            Phase::Rejected => (Event::Explained, "rejection passed to synthesis".to_string()),

            Phase::Executing => {
                let canonical = match run.state.verdict() {
                    Some(Verdict::Accepted { canonical }) => canonical.clone(),
                    _ => {
                        return Err(OrchestrationError::InternalStateError(
                            "executing without an accepted verdict".to_string(),
                        ))
                    }
                };
                let rows = guarded(
                    phase,
                    &run.cancel,
                    run.deadline,
                    OrchestrationError::ExecutionFailed,
                    self.executor.execute_read_query(&canonical),
                )
                .await?;
                let note = format!("{} row(s)", rows.len());
                run.state.set_rows(rows)?;
                (Event::Executed, note)
            }

            Phase::Synthesizing => {
                run.state.ensure_synthesizable()?;
                let evidence = Evidence {
                    context: run.state.context(),
                    rows: run.state.rows(),
                    rejection: run.state.rejection(),
                };
                let synthesis = guarded(
                    phase,
                    &run.cancel,
                    run.deadline,
                    OrchestrationError::InternalStateError,
                    async {
                        Ok::<_, OrchestrationError>(
                            self.synthesizer.synthesize(run.state.question(), evidence).await,
                        )
                    },
                )
                .await?;
                run.flags = synthesis.flags;
                run.state.set_answer(synthesis.answer)?;
                (Event::Synthesized, "answer ready".to_string())
            }

            Phase::Done | Phase::Failed => {
                return Err(OrchestrationError::InternalStateError(format!(
                    "no work defined for terminal phase {}",
                    phase
                )))
            }
        };

        run.trace.push(format!("{}: {}", phase, note));
        Ok(event)
    }
}

/// Await `call` unless the request is cancelled or its deadline passes
/// first. Collaborator errors of an unexpected kind are re-labelled with
/// `failure` so the caller sees which step failed.
async fn guarded<T, F>(
    phase: Phase,
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
    failure: fn(String) -> OrchestrationError,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let raced = async {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OrchestrationError::Cancelled(phase)),
            out = call => out.map_err(|e| label_failure(e, failure)),
        }
    };

    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, raced)
            .await
            .map_err(|_| OrchestrationError::DeadlineExceeded(phase))?,
        None => raced.await,
    }
}

fn label_failure(
    err: OrchestrationError,
    failure: fn(String) -> OrchestrationError,
) -> OrchestrationError {
    match err {
        e @ (OrchestrationError::ClassificationFailed(_)
        | OrchestrationError::RetrievalFailed(_)
        | OrchestrationError::GenerationFailed(_)
        | OrchestrationError::ExecutionFailed(_)
        | OrchestrationError::InternalStateError(_)
        | OrchestrationError::Cancelled(_)
        | OrchestrationError::DeadlineExceeded(_)) => e,
        other => failure(other.to_string()),
    }
}
