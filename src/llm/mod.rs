//! LLM capability traits and the structured verdict schema
//!
//! The orchestrator only ever talks to these traits. Concrete backends
//! (Ollama, Gemini) map transport failures to `CapabilityUnavailable` and
//! hand raw classifier text to `Grade::from_json`, which fails closed.

use crate::config::{AppConfig, LlmProvider};
use crate::error::OrchestrationError;
use crate::models::Capability;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Free-form text completion
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Binary classification with an optional explanation
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn complete_structured(&self, instructions: &str, prompt: &str) -> Result<Grade>;
}

/// Text embeddings for retrieval
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum BinaryScore {
    Yes,
    No,
}

impl BinaryScore {
    pub fn is_yes(&self) -> bool {
        matches!(self, BinaryScore::Yes)
    }
}

impl TryFrom<String> for BinaryScore {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "yes" => Ok(BinaryScore::Yes),
            "no" => Ok(BinaryScore::No),
            _ => Err(format!("binary_score must be 'yes' or 'no', got '{}'", value)),
        }
    }
}

/// A validated classifier verdict
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Grade {
    pub binary_score: BinaryScore,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Grade {
    pub fn is_yes(&self) -> bool {
        self.binary_score.is_yes()
    }

    /// Decode a classifier completion. Anything but the exact verdict shape
    /// is a schema violation; there is no default verdict.
    pub fn from_json(raw: &str) -> Result<Self> {
        let cleaned = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        serde_json::from_str(cleaned).map_err(|e| {
            OrchestrationError::schema(
                Capability::Classifier,
                format!("{} | raw={}", e, raw),
            )
        })
    }
}

/// Chat backend selected by configuration, shared by generator and classifier
pub struct ChatBackend {
    pub generator: Arc<dyn Generator>,
    pub classifier: Arc<dyn Classifier>,
}

pub fn build_chat_backend(config: &AppConfig) -> Result<ChatBackend> {
    match config.llm_provider {
        LlmProvider::Ollama => {
            let client = Arc::new(OllamaClient::new(
                &config.ollama_base_url,
                &config.ollama_model,
                &config.embedding_model,
            )?);
            Ok(ChatBackend {
                generator: client.clone(),
                classifier: client,
            })
        }
        LlmProvider::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                OrchestrationError::ConfigError("GEMINI_API_KEY not configured".to_string())
            })?;
            let client = Arc::new(GeminiClient::new(api_key, &config.gemini_model)?);
            Ok(ChatBackend {
                generator: client.clone(),
                classifier: client,
            })
        }
    }
}
