//! Session state machine
//!
//! RETRIEVE → FILTER → GENERATE → VERIFY → SUCCESS | ABORTED
//!
//! VERIFY loops back to GENERATE on `retry-generate` and to RETRIEVE on
//! `retry-retrieve`. FILTER may end the session early on empty evidence.
//!
//! `transition` is pure: the orchestrator performs the work for a stage,
//! reports what happened as an `Event`, and asks for the next stage.

use crate::config::EmptyEvidencePolicy;
use crate::error::OrchestrationError;
use crate::models::{AbortReason, Passage};
use crate::verification::Decision;
use crate::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieve,
    Filter,
    Generate,
    Verify,
    Success,
    Aborted(AbortReason),
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Success | Stage::Aborted(_))
    }
}

/// Outcome of the document-sufficiency gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Retrieved,
    Filtered(Gate),
    Generated,
    Verified(Decision),
}

pub fn transition(stage: Stage, event: Event) -> Result<Stage> {
    let next = match (stage, event) {
        (Stage::Retrieve, Event::Retrieved) => Stage::Filter,
        (Stage::Filter, Event::Filtered(Gate::Proceed)) => Stage::Generate,
        (Stage::Filter, Event::Filtered(Gate::Abort)) => {
            Stage::Aborted(AbortReason::NoRelevantDocuments)
        }
        (Stage::Generate, Event::Generated) => Stage::Verify,
        (Stage::Verify, Event::Verified(decision)) => match decision {
            Decision::Useful => Stage::Success,
            Decision::RetryGenerate => Stage::Generate,
            Decision::RetryRetrieve => Stage::Retrieve,
            Decision::AbortMaxRetries => Stage::Aborted(AbortReason::MaxRetriesExceeded),
        },
        (stage, event) => {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{:?} does not accept {:?}",
                stage, event
            )))
        }
    };

    Ok(next)
}

/// Decide whether filtered evidence is enough to attempt an answer
pub fn evidence_gate(documents: &[Passage], policy: EmptyEvidencePolicy) -> Gate {
    match policy {
        EmptyEvidencePolicy::Abort if documents.is_empty() => Gate::Abort,
        _ => Gate::Proceed,
    }
}
