//! Main orchestrator - drives one question-answering session
//!
//! RETRIEVE → FILTER → GENERATE → VERIFY → SUCCESS | ABORTED
//!
//! The orchestrator owns the `ConversationState` for the session, runs the
//! component for the current stage, and asks `machine::transition` where to
//! go next. Fatal component errors end the session immediately.

pub mod machine;

use crate::audit::{compute_evidence_hash, AuditLog, SessionRecord, SessionStatus};
use crate::config::{AppConfig, EmptyEvidencePolicy};
use crate::corpus::load_corpus;
use crate::error::OrchestrationError;
use crate::generation::AnswerGenerator;
use crate::llm::{build_chat_backend, OllamaClient};
use crate::models::{SessionOutcome, SessionReport, SessionRequest};
use crate::relevance::RelevanceFilter;
use crate::retrieval::{Retriever, VectorRetriever};
use crate::state::{ConversationState, DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT};
use crate::verification::AnswerVerifier;
use crate::Result;
use chrono::Utc;
use machine::{evidence_gate, transition, Event, Stage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub default_max_retries: u32,
    pub max_retries_limit: u32,
    pub empty_evidence_policy: EmptyEvidencePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            max_retries_limit: MAX_RETRIES_LIMIT,
            empty_evidence_policy: EmptyEvidencePolicy::Abort,
        }
    }
}

/// Per-session bookkeeping that is not part of the conversation state
#[derive(Debug, Default)]
struct SessionProgress {
    retrievals: u32,
    reasoning_trace: Vec<String>,
}

/// Main orchestrator that coordinates the entire workflow
pub struct Orchestrator {
    retriever: Arc<dyn Retriever>,
    relevance_filter: RelevanceFilter,
    answer_generator: AnswerGenerator,
    answer_verifier: AnswerVerifier,
    audit_log: AuditLog,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        relevance_filter: RelevanceFilter,
        answer_generator: AnswerGenerator,
        answer_verifier: AnswerVerifier,
        audit_log: AuditLog,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            retriever,
            relevance_filter,
            answer_generator,
            answer_verifier,
            audit_log,
            config,
        }
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    /// Run one session to a terminal state.
    ///
    /// `Ok` carries either an answer or an explicit no-answer outcome;
    /// `Err` means a capability or schema failure aborted the session.
    pub async fn run(&self, request: SessionRequest) -> Result<SessionReport> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(OrchestrationError::InvalidRequest(
                "Question cannot be empty".to_string(),
            ));
        }

        let start_time = Instant::now();
        let session_id = Uuid::new_v4();
        let max_retries = request
            .max_retries
            .unwrap_or(self.config.default_max_retries);
        if max_retries > self.config.max_retries_limit {
            return Err(OrchestrationError::InvalidRequest(format!(
                "max_retries {} exceeds the limit of {}",
                max_retries, self.config.max_retries_limit
            )));
        }

        let mut state = ConversationState::new(question, max_retries);
        let mut progress = SessionProgress::default();

        info!(
            %session_id,
            question = %question,
            max_retries,
            "Orchestrator: starting session"
        );
        progress
            .reasoning_trace
            .push("INPUT: Question received".to_string());

        let terminal = self.drive(&mut state, &mut progress).await;

        let evidence_hash = compute_evidence_hash(state.question(), state.documents())?;
        let mut record = SessionRecord {
            session_id,
            question: state.question().to_string(),
            status: SessionStatus::Failed,
            answer: None,
            abort_reason: None,
            error: None,
            loop_step: state.loop_step(),
            max_retries,
            retrievals: progress.retrievals,
            evidence_hash,
            reasoning_trace: Vec::new(),
            created_at: Utc::now(),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };

        let stage = match terminal {
            Ok(stage) => stage,
            Err(e) => {
                warn!(
                    %session_id,
                    error = %e,
                    kind = e.kind().as_str(),
                    loop_step = state.loop_step(),
                    "Session aborted by fatal error"
                );
                progress.reasoning_trace.push(format!("ABORTED: {}", e));
                record.error = Some(e.to_string());
                record.reasoning_trace = progress.reasoning_trace;
                self.audit_log.record(record).await?;
                return Err(e);
            }
        };

        let loop_step = state.loop_step();
        let evidence_count = state.documents().len();

        let outcome = match stage {
            Stage::Success => {
                let answer = state.into_generation().ok_or_else(|| {
                    OrchestrationError::InvalidTransition(
                        "session succeeded without a generation".to_string(),
                    )
                })?;
                progress
                    .reasoning_trace
                    .push("COMPLETE: Answer is grounded and useful".to_string());
                SessionOutcome::Answered { answer }
            }
            Stage::Aborted(reason) => {
                warn!(%session_id, %reason, loop_step, "Session ended without an answer");
                progress
                    .reasoning_trace
                    .push(format!("ABORTED: {}", reason));
                SessionOutcome::NoAnswer { reason }
            }
            other => {
                return Err(OrchestrationError::InvalidTransition(format!(
                    "session stopped in non-terminal stage {:?}",
                    other
                )))
            }
        };

        match &outcome {
            SessionOutcome::Answered { answer } => {
                record.status = SessionStatus::Answered;
                record.answer = Some(answer.clone());
            }
            SessionOutcome::NoAnswer { reason } => {
                record.status = SessionStatus::NoAnswer;
                record.abort_reason = Some(*reason);
            }
        }
        record.reasoning_trace = progress.reasoning_trace.clone();
        self.audit_log.record(record).await?;

        info!(
            %session_id,
            loop_step,
            retrievals = progress.retrievals,
            answered = outcome.answer().is_some(),
            "Session complete"
        );

        Ok(SessionReport {
            session_id,
            outcome,
            loop_step,
            retrievals: progress.retrievals,
            evidence_count,
            reasoning_trace: progress.reasoning_trace,
        })
    }

    /// Execute stages until a terminal one is reached
    async fn drive(
        &self,
        state: &mut ConversationState,
        progress: &mut SessionProgress,
    ) -> Result<Stage> {
        let mut stage = Stage::Retrieve;

        loop {
            let event = match stage {
                Stage::Retrieve => {
                    let documents = self.retriever.search(state.question()).await?;
                    progress.retrievals += 1;
                    progress.reasoning_trace.push(format!(
                        "RETRIEVE: {} passages (retrieval {})",
                        documents.len(),
                        progress.retrievals
                    ));
                    state.replace_documents(documents);
                    Event::Retrieved
                }
                Stage::Filter => {
                    let report = self.relevance_filter.filter(state).await?;
                    progress.reasoning_trace.push(format!(
                        "FILTER: {} / {} passages relevant",
                        report.retained, report.graded
                    ));
                    Event::Filtered(evidence_gate(
                        state.documents(),
                        self.config.empty_evidence_policy,
                    ))
                }
                Stage::Generate => {
                    self.answer_generator.generate(state).await?;
                    progress
                        .reasoning_trace
                        .push(format!("GENERATE: attempt {}", state.loop_step()));
                    Event::Generated
                }
                Stage::Verify => {
                    let result = self.answer_verifier.verify(state).await?;
                    progress.reasoning_trace.push(format!(
                        "VERIFY: grounded={} responsive={} -> {}",
                        result.grounding.passed,
                        result
                            .responsiveness
                            .as_ref()
                            .map(|c| c.passed.to_string())
                            .unwrap_or_else(|| "skipped".to_string()),
                        result.decision
                    ));
                    Event::Verified(result.decision)
                }
                Stage::Success | Stage::Aborted(_) => return Ok(stage),
            };

            let next = transition(stage, event)?;
            debug!(from = ?stage, to = ?next, loop_step = state.loop_step(), "Stage transition");
            stage = next;
        }
    }
}

/// Wire up the production stack from configuration: chat backend for
/// generation and classification, Ollama embeddings over the loaded corpus.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let backend = build_chat_backend(config)?;

    let embedder = Arc::new(OllamaClient::new(
        &config.ollama_base_url,
        &config.ollama_model,
        &config.embedding_model,
    )?);
    let retriever = VectorRetriever::new(embedder, config.top_k);

    let passages = load_corpus(&config.corpus_dir, config.chunk_size, config.chunk_overlap).await?;
    retriever.index_passages(passages).await?;

    Ok(Orchestrator::new(
        Arc::new(retriever),
        RelevanceFilter::new(backend.classifier.clone(), config.filter_concurrency),
        AnswerGenerator::new(backend.generator),
        AnswerVerifier::new(backend.classifier),
        AuditLog::with_capacity(config.audit_capacity),
        OrchestratorConfig {
            default_max_retries: config.default_max_retries,
            max_retries_limit: config.max_retries_limit,
            empty_evidence_policy: config.empty_evidence_policy,
        },
    ))
}
