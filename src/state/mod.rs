//! Conversation state threaded through one session
//!
//! Fields are private so that the only mutations are the ones the
//! orchestrator's components are allowed to make: documents are replaced by
//! a retrieval or narrowed by a filter, and every recorded generation bumps
//! `loop_step` by exactly one.

use crate::error::OrchestrationError;
use crate::models::Passage;
use crate::Result;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct ConversationState {
    question: String,
    documents: Vec<Passage>,
    generation: Option<String>,
    loop_step: u32,
    max_retries: u32,
}

impl ConversationState {
    pub fn new(question: impl Into<String>, max_retries: u32) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: None,
            loop_step: 0,
            max_retries,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn documents(&self) -> &[Passage] {
        &self.documents
    }

    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    pub fn loop_step(&self) -> u32 {
        self.loop_step
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True once the retry bound no longer admits another attempt
    pub fn retries_exhausted(&self) -> bool {
        self.loop_step > self.max_retries
    }

    /// Install a fresh retrieval result
    pub fn replace_documents(&mut self, documents: Vec<Passage>) {
        self.documents = documents;
    }

    /// Keep the passages whose verdict is `true`, in their current order.
    pub fn retain_relevant(&mut self, verdicts: &[bool]) -> Result<()> {
        if verdicts.len() != self.documents.len() {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{} verdicts for {} documents",
                verdicts.len(),
                self.documents.len()
            )));
        }

        let mut keep = verdicts.iter();
        self.documents.retain(|_| *keep.next().unwrap_or(&false));
        Ok(())
    }

    /// Record a completed generation and count it against the retry bound
    pub fn record_generation(&mut self, text: String) -> Result<()> {
        self.loop_step = self.loop_step.checked_add(1).ok_or_else(|| {
            OrchestrationError::InvalidTransition("loop_step overflowed".to_string())
        })?;
        self.generation = Some(text);
        Ok(())
    }

    /// Hand back the final answer, if one was ever generated
    pub fn into_generation(self) -> Option<String> {
        self.generation
    }
}
