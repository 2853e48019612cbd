//! Corrective RAG Orchestrator
//!
//! Answers questions from a document corpus and refuses to answer when it
//! cannot do so faithfully:
//! - Retrieves candidate passages by vector similarity
//! - Grades each passage for relevance and drops the rest
//! - Generates a concise answer from the surviving evidence
//! - Verifies the answer is grounded in that evidence and responsive to the question
//! - Retries generation or retrieval within a bounded budget
//! - Records every session in an auditable trail
//!
//! SESSION LOOP:
//! RETRIEVE → FILTER → GENERATE → VERIFY → SUCCESS | ABORTED

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod corpus;
pub mod error;
pub mod generation;
pub mod history;
pub mod llm;
pub mod models;
pub mod relevance;
pub mod retrieval;
pub mod state;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
