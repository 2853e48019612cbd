//! Core data models for the question-answering orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

/// External capabilities consumed by a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Retriever,
    Classifier,
    Generator,
    Embedder,
}

/// Why a session ended without an answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    MaxRetriesExceeded,
    NoRelevantDocuments,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    System,
}

//
// ================= Evidence =================
//

/// A retrieved unit of text considered as candidate evidence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Passage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

//
// ================= Session =================
//

/// Session entry point input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub question: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl SessionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Answered { answer: String },
    NoAnswer { reason: AbortReason },
}

impl SessionOutcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            SessionOutcome::Answered { answer } => Some(answer),
            SessionOutcome::NoAnswer { .. } => None,
        }
    }
}

/// Final result of one session that reached a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    /// Completed Answer Generator invocations
    pub loop_step: u32,
    /// Completed retrievals, including the initial one
    pub retrievals: u32,
    pub evidence_count: usize,
    pub reasoning_trace: Vec<String>,
}

//
// ================= History =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub role: ChatRole,
    pub content: String,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Retriever => "retriever",
            Capability::Classifier => "classifier",
            Capability::Generator => "generator",
            Capability::Embedder => "embedder",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::MaxRetriesExceeded => "maximum retries exceeded",
            AbortReason::NoRelevantDocuments => "no relevant documents found",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatRole::User => "user",
            ChatRole::System => "system",
        };
        write!(f, "{}", s)
    }
}
