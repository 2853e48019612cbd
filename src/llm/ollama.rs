//! Ollama client backing all three LLM capabilities
//!
//! Uses the non-streaming `/api/chat` endpoint at temperature 0 and the
//! batched `/api/embed` endpoint. One long-lived reqwest::Client for pooling.

use crate::error::OrchestrationError;
use crate::llm::{Classifier, Embedder, Generator, Grade};
use crate::models::Capability;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, embedding_model: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| {
                OrchestrationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }

    async fn chat(
        &self,
        capability: Capability,
        messages: Vec<Message>,
        json_mode: bool,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: json_mode.then_some("json"),
            options: ChatOptions { temperature: 0.0 },
        };

        debug!(model = %self.model, %capability, json_mode, "Calling Ollama chat");

        let response: ChatResponse = self.post(capability, "/api/chat", &request).await?;
        Ok(response.message.content)
    }

    async fn post<B, R>(&self, capability: Capability, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request to {} failed: {}", path, e);
                OrchestrationError::unavailable(capability, format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama error response ({}): {}", status, error_text);
            return Err(OrchestrationError::unavailable(
                capability,
                format!("Ollama returned {}: {}", status, error_text),
            ));
        }

        response.json::<R>().await.map_err(|e| {
            OrchestrationError::unavailable(
                capability,
                format!("Unreadable Ollama response: {}", e),
            )
        })
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(Capability::Generator, vec![Message::user(prompt)], false)
            .await
    }
}

#[async_trait]
impl Classifier for OllamaClient {
    async fn complete_structured(&self, instructions: &str, prompt: &str) -> Result<Grade> {
        let raw = self
            .chat(
                Capability::Classifier,
                vec![Message::system(instructions), Message::user(prompt)],
                true,
            )
            .await?;

        Grade::from_json(&raw)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: inputs,
        };

        let response: EmbedResponse = self
            .post(Capability::Embedder, "/api/embed", &request)
            .await?;

        if response.embeddings.len() != inputs.len() {
            return Err(OrchestrationError::unavailable(
                Capability::Embedder,
                format!(
                    "Ollama returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    inputs.len()
                ),
            ));
        }

        Ok(response.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn system(content: &str) -> Self {
        Self {
            role: "system",
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user",
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
