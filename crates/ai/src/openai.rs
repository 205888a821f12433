//! OpenAI-compatible chat-completions provider.
//!
//! Sends the persona instruction as the system message and the document text
//! as the user message, then maps HTTP/transport failures onto the
//! `GenerationError` taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GenerationError;
use crate::generator::{GenerationRequest, TextGenerator};

/// Default OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Full chat-completions URL; `None` uses the public OpenAI endpoint.
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.7,
        }
    }
}

/// Generator backed by an OpenAI-compatible HTTP API.
pub struct OpenAiGenerator {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    fn build_request_body(&self, system_instruction: &str, document_text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                { "role": "system", "content": system_instruction },
                { "role": "user", "content": document_text },
            ],
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        let body = self.build_request_body(request.system_instruction, request.document_text);

        let response = self
            .client
            .post(self.base_url())
            .bearer_auth(&self.config.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), model = %self.config.model, "generation request rejected");
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        extract_feedback(parsed)
    }
}

// -------------------------
// Wire types
// -------------------------

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

// -------------------------
// Failure mapping
// -------------------------

fn transport_error(err: reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(timeout)
    } else {
        GenerationError::TransientNetwork(err.to_string())
    }
}

fn classify_http_error(status: u16, body: &str) -> GenerationError {
    let (message, code) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => (env.error.message, env.error.code.unwrap_or_default()),
        Err(_) => (body.trim().to_string(), String::new()),
    };
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {message}")
    };

    match status {
        429 => GenerationError::RateLimited(message),
        408 | 500..=599 => GenerationError::TransientNetwork(message),
        400 if code.contains("content_policy") || code.contains("content_filter") => {
            GenerationError::ContentRejected(message)
        }
        400..=499 => GenerationError::InvalidPersonaConfig(message),
        _ => GenerationError::TransientNetwork(message),
    }
}

fn extract_feedback(response: ChatCompletionResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::TransientNetwork("completion had no choices".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GenerationError::ContentRejected(
            "completion stopped by content filter".to_string(),
        ));
    }

    match choice.message.and_then(|m| m.content) {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(GenerationError::TransientNetwork(
            "completion had empty content".to_string(),
        )),
    }
}
