//! Answer verification
//!
//! Two sequential classifier checks: grounding against the filtered evidence,
//! then (only if grounded) responsiveness to the question. The outcome is
//! turned into a `Decision` by a pure function of the two verdicts and the
//! retry counters.

use crate::error::OrchestrationError;
use crate::generation::format_context;
use crate::llm::Classifier;
use crate::state::ConversationState;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub(crate) const GROUNDING_INSTRUCTIONS: &str = r#"You are a teacher grading a quiz. You will be given FACTS and a STUDENT ANSWER.

Grade criteria:
(1) The STUDENT ANSWER is grounded in the FACTS.
(2) The STUDENT ANSWER does not contain hallucinated information outside the scope of the FACTS.

A score of yes means the answer meets all of the criteria. A score of no means it does not.
Explain your reasoning step by step before reaching a conclusion."#;

pub(crate) const RESPONSIVENESS_INSTRUCTIONS: &str = r#"You are a teacher grading a quiz. You will be given a QUESTION and a STUDENT ANSWER.

Grade criteria:
(1) The STUDENT ANSWER helps to answer the QUESTION.

A score of yes means the answer meets the criteria, even if it contains extra information that was not asked for. A score of no means it does not.
Explain your reasoning step by step before reaching a conclusion."#;

fn grounding_prompt(facts: &str, generation: &str) -> String {
    format!(
        "FACTS:\n\n{}\n\nSTUDENT ANSWER: {}\n\nReturn JSON with two keys: binary_score, 'yes' or \
'no' to indicate whether the STUDENT ANSWER is grounded in the FACTS, and explanation, which \
explains the score.",
        facts, generation
    )
}

fn responsiveness_prompt(question: &str, generation: &str) -> String {
    format!(
        "QUESTION:\n\n{}\n\nSTUDENT ANSWER: {}\n\nReturn JSON with two keys: binary_score, 'yes' or \
'no' to indicate whether the STUDENT ANSWER meets the criteria, and explanation, which \
explains the score.",
        question, generation
    )
}

/// Next step chosen after verifying a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Useful,
    RetryGenerate,
    RetryRetrieve,
    AbortMaxRetries,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Useful => "useful",
            Decision::RetryGenerate => "retry-generate",
            Decision::RetryRetrieve => "retry-retrieve",
            Decision::AbortMaxRetries => "abort-max-retries",
        };
        write!(f, "{}", s)
    }
}

/// Decision policy. `responsive` is `None` when the responsiveness check
/// was skipped because grounding failed.
pub fn decide(grounded: bool, responsive: Option<bool>, loop_step: u32, max_retries: u32) -> Decision {
    let within_budget = loop_step <= max_retries;

    match (grounded, responsive) {
        (true, Some(true)) => Decision::Useful,
        (false, _) if within_budget => Decision::RetryGenerate,
        (true, _) if within_budget => Decision::RetryRetrieve,
        _ => Decision::AbortMaxRetries,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub grounding: VerificationCheck,
    pub responsiveness: Option<VerificationCheck>,
    pub decision: Decision,
    pub verified_at: DateTime<Utc>,
}

pub struct AnswerVerifier {
    classifier: Arc<dyn Classifier>,
}

impl AnswerVerifier {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub async fn verify(&self, state: &ConversationState) -> Result<VerificationResult> {
        let generation = state.generation().ok_or_else(|| {
            OrchestrationError::InvalidTransition(
                "verification requested before any generation".to_string(),
            )
        })?;

        let facts = format_context(state.documents());
        let grade = self
            .classifier
            .complete_structured(GROUNDING_INSTRUCTIONS, &grounding_prompt(&facts, generation))
            .await?;

        let grounding = VerificationCheck {
            name: "grounding".to_string(),
            passed: grade.is_yes(),
            explanation: grade.explanation,
        };

        let responsiveness = if grounding.passed {
            let grade = self
                .classifier
                .complete_structured(
                    RESPONSIVENESS_INSTRUCTIONS,
                    &responsiveness_prompt(state.question(), generation),
                )
                .await?;

            Some(VerificationCheck {
                name: "responsiveness".to_string(),
                passed: grade.is_yes(),
                explanation: grade.explanation,
            })
        } else {
            None
        };

        let decision = decide(
            grounding.passed,
            responsiveness.as_ref().map(|c| c.passed),
            state.loop_step(),
            state.max_retries(),
        );

        info!(
            grounded = grounding.passed,
            responsive = ?responsiveness.as_ref().map(|c| c.passed),
            loop_step = state.loop_step(),
            max_retries = state.max_retries(),
            %decision,
            "Verification completed"
        );

        Ok(VerificationResult {
            grounding,
            responsiveness,
            decision,
            verified_at: Utc::now(),
        })
    }
}

//
// ================= Tests =================
//
