//! Gemini API client for generation and classification
//!
//! Uses a long-lived reqwest::Client for connection pooling. Classification
//! requests ask for `application/json` output and are validated as a `Grade`.

use crate::error::OrchestrationError;
use crate::llm::{Classifier, Generator, Grade};
use crate::models::Capability;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                model
            ),
        })
    }

    /// Generate a response from Gemini
    async fn generate(
        &self,
        capability: Capability,
        system_prompt: Option<&str>,
        prompt: &str,
        json_mode: bool,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::unavailable(
                capability,
                "GEMINI_API_KEY not configured",
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);
        let request = build_request(system_prompt, prompt, json_mode);

        info!(%capability, json_mode, "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::unavailable(capability, format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(OrchestrationError::unavailable(
                capability,
                format!("Gemini API error: {}", error_text),
            ));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::unavailable(capability, format!("Gemini parse error: {}", e))
        })?;

        first_candidate_text(gemini_response).ok_or_else(|| {
            OrchestrationError::unavailable(capability, "Empty response from Gemini")
        })
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(Capability::Generator, None, prompt, false)
            .await
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn complete_structured(&self, instructions: &str, prompt: &str) -> Result<Grade> {
        let raw = self
            .generate(Capability::Classifier, Some(instructions), prompt, true)
            .await?;

        Grade::from_json(&raw)
    }
}

fn build_request(system_prompt: Option<&str>, prompt: &str, json_mode: bool) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type: json_mode.then(|| "application/json".to_string()),
        },
        system_instruction: system_prompt.map(|text| SystemInstruction {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }),
    }
}

fn first_candidate_text(response: GeminiResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content
        .parts
        .into_iter()
        .next()
        .map(|part| part.text)
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
