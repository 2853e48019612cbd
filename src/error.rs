//! Error types for the question-answering orchestrator

use crate::models::Capability;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Coarse classification of a fatal error, used by callers to tell
/// capability outages apart from malformed classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Capability,
    Schema,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Capability => "capability_unavailable",
            ErrorKind::Schema => "schema_violation",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Session Errors (fatal)
    // =============================

    #[error("{capability} capability unavailable: {message}")]
    CapabilityUnavailable {
        capability: Capability,
        message: String,
    },

    #[error("{capability} response violated schema: {message}")]
    SchemaViolation {
        capability: Capability,
        message: String,
    },

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =============================
    // Infrastructure Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Corpus error: {0}")]
    CorpusError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn unavailable(capability: Capability, message: impl Into<String>) -> Self {
        OrchestrationError::CapabilityUnavailable {
            capability,
            message: message.into(),
        }
    }

    pub fn schema(capability: Capability, message: impl Into<String>) -> Self {
        OrchestrationError::SchemaViolation {
            capability,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::CapabilityUnavailable { .. } => ErrorKind::Capability,
            OrchestrationError::SchemaViolation { .. } => ErrorKind::Schema,
            _ => ErrorKind::Internal,
        }
    }
}
