//! Environment-driven configuration
//!
//! Binaries call `dotenv::dotenv().ok()` first, then `AppConfig::from_env()`.
//! Unset keys fall back to defaults; malformed values fail startup.

use crate::error::OrchestrationError;
use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::state::{DEFAULT_MAX_RETRIES, MAX_RETRIES_LIMIT};
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    Gemini,
}

impl FromStr for LlmProvider {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "gemini" => Ok(LlmProvider::Gemini),
            other => Err(OrchestrationError::ConfigError(format!(
                "LLM_PROVIDER must be 'ollama' or 'gemini', got '{}'",
                other
            ))),
        }
    }
}

/// What to do when relevance filtering leaves no passages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyEvidencePolicy {
    /// End the session with no answer before calling the generator
    Abort,
    /// Generate anyway from an empty context
    Proceed,
}

impl FromStr for EmptyEvidencePolicy {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(EmptyEvidencePolicy::Abort),
            "proceed" => Ok(EmptyEvidencePolicy::Proceed),
            other => Err(OrchestrationError::ConfigError(format!(
                "EMPTY_EVIDENCE_POLICY must be 'abort' or 'proceed', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm_provider: LlmProvider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub embedding_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub corpus_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub default_max_retries: u32,
    /// Largest `max_retries` a caller may request
    pub max_retries_limit: u32,
    pub filter_concurrency: usize,
    pub empty_evidence_policy: EmptyEvidencePolicy,
    pub database_url: Option<String>,
    /// Sessions kept in the audit trail before the oldest are evicted
    pub audit_capacity: usize,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:3b-instruct-fp16".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            corpus_dir: PathBuf::from("./corpus"),
            chunk_size: 1000,
            chunk_overlap: 300,
            top_k: 3,
            default_max_retries: DEFAULT_MAX_RETRIES,
            max_retries_limit: MAX_RETRIES_LIMIT,
            filter_concurrency: 4,
            empty_evidence_policy: EmptyEvidencePolicy::Abort,
            database_url: None,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            llm_provider: match get("LLM_PROVIDER") {
                Some(v) => v.parse()?,
                None => defaults.llm_provider,
            },
            ollama_base_url: get("OLLAMA_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_base_url),
            ollama_model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            corpus_dir: get("CORPUS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.corpus_dir),
            chunk_size: parse_or("CHUNK_SIZE", get("CHUNK_SIZE"), defaults.chunk_size)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", get("CHUNK_OVERLAP"), defaults.chunk_overlap)?,
            top_k: parse_or("RETRIEVER_TOP_K", get("RETRIEVER_TOP_K"), defaults.top_k)?,
            default_max_retries: parse_or(
                "DEFAULT_MAX_RETRIES",
                get("DEFAULT_MAX_RETRIES"),
                defaults.default_max_retries,
            )?,
            max_retries_limit: parse_or(
                "MAX_RETRIES_LIMIT",
                get("MAX_RETRIES_LIMIT"),
                defaults.max_retries_limit,
            )?,
            filter_concurrency: parse_or(
                "FILTER_CONCURRENCY",
                get("FILTER_CONCURRENCY"),
                defaults.filter_concurrency,
            )?,
            empty_evidence_policy: match get("EMPTY_EVIDENCE_POLICY") {
                Some(v) => v.parse()?,
                None => defaults.empty_evidence_policy,
            },
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            audit_capacity: parse_or(
                "AUDIT_CAPACITY",
                get("AUDIT_CAPACITY"),
                defaults.audit_capacity,
            )?,
            port: parse_or("PORT", get("PORT").or_else(|| get("API_PORT")), defaults.port)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(OrchestrationError::ConfigError(
                "CHUNK_SIZE must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(OrchestrationError::ConfigError(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(OrchestrationError::ConfigError(
                "RETRIEVER_TOP_K must be positive".to_string(),
            ));
        }
        if self.default_max_retries > self.max_retries_limit {
            return Err(OrchestrationError::ConfigError(format!(
                "DEFAULT_MAX_RETRIES ({}) exceeds MAX_RETRIES_LIMIT ({})",
                self.default_max_retries, self.max_retries_limit
            )));
        }
        if self.audit_capacity == 0 {
            return Err(OrchestrationError::ConfigError(
                "AUDIT_CAPACITY must be positive".to_string(),
            ));
        }
        if self.filter_concurrency == 0 {
            return Err(OrchestrationError::ConfigError(
                "FILTER_CONCURRENCY must be positive".to_string(),
            ));
        }
        if self.llm_provider == LlmProvider::Gemini && self.gemini_api_key.is_none() {
            return Err(OrchestrationError::ConfigError(
                "GEMINI_API_KEY is required when LLM_PROVIDER=gemini".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has invalid value '{}'", key, raw))
        }),
        None => Ok(default),
    }
}
