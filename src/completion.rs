//! Streaming completion providers.
//!
//! A [`CompletionProvider`] takes a fully rendered prompt and returns a
//! [`TextStream`] of answer increments. Two hosted backends are provided:
//! - **[`GeminiCompletion`]**: `models/{model}:streamGenerateContent?alt=sse`
//! - **[`OpenAICompletion`]**: `POST /v1/chat/completions` with `stream: true`
//!
//! Both read the HTTP body as server-sent events and yield only the text
//! deltas. Errors from either the initial request or a later event end the
//! stream with [`RagError::Completion`]. Nothing is retried.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::{api_key_from_env, error_body};
use crate::error::{RagError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Lazy, finite stream of answer increments. Consumed once.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs and error messages (`"gemini"`, `"openai"`).
    fn name(&self) -> &str;
    fn model_name(&self) -> &str;
    /// Submit `prompt` and start streaming the reply.
    async fn complete(&self, prompt: &str) -> Result<TextStream>;
}

/// Create the configured completion provider.
///
/// # Errors
///
/// [`RagError::MissingCredential`] if the API key variable is unset.
pub fn create_completion(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>> {
    let api_key = api_key_from_env(&config.key_env())?;
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| RagError::completion(&config.provider, e.to_string()))?;

    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAICompletion {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.model_or_default(),
            temperature: config.temperature,
        })),
        "gemini" => Ok(Arc::new(GeminiCompletion {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config
                .model_or_default()
                .trim_start_matches("models/")
                .to_string(),
            temperature: config.temperature,
        })),
        other => Err(RagError::completion(other, "unknown completion provider")),
    }
}

/// Turn an SSE response body into text increments using `delta` to parse each event.
fn sse_text_stream(
    provider: &'static str,
    response: reqwest::Response,
    delta: fn(&str) -> Result<Option<String>>,
) -> TextStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .map_err(move |e| RagError::completion(provider, format!("stream error: {}", e)))
        .try_filter_map(move |event| async move { delta(&event.data) })
        .try_filter(|text| futures::future::ready(!text.is_empty()));
    Box::pin(stream)
}

// ============ Gemini ============

pub struct GeminiCompletion {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    fn name(&self) -> &str {
        "gemini"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<TextStream> {
        tracing::debug!(provider = "gemini", model = %self.model, prompt_chars = prompt.len(), "starting completion");
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::completion("gemini", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::completion("gemini", error_body(response).await));
        }
        Ok(sse_text_stream("gemini", response, gemini_delta))
    }
}

/// Extract the text of one `streamGenerateContent` event.
pub fn gemini_delta(data: &str) -> Result<Option<String>> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| RagError::completion("gemini", format!("malformed event: {}", e)))?;

    if let Some(message) = value["error"]["message"].as_str() {
        return Err(RagError::completion("gemini", message));
    }
    if let Some(reason) = value["promptFeedback"]["blockReason"].as_str() {
        return Err(RagError::completion(
            "gemini",
            format!("prompt blocked: {}", reason),
        ));
    }

    let candidate = &value["candidates"][0];
    if let Some(reason) = candidate["finishReason"].as_str() {
        if !matches!(reason, "STOP" | "MAX_TOKENS" | "FINISH_REASON_UNSPECIFIED") {
            return Err(RagError::completion(
                "gemini",
                format!("answer stopped early: {}", reason),
            ));
        }
    }

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    Ok(Some(text).filter(|t| !t.is_empty()))
}

// ============ OpenAI ============

pub struct OpenAICompletion {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    fn name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<TextStream> {
        tracing::debug!(provider = "openai", model = %self.model, prompt_chars = prompt.len(), "starting completion");
        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": true,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::completion("openai", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::completion("openai", error_body(response).await));
        }
        Ok(sse_text_stream("openai", response, openai_delta))
    }
}

/// Extract the text of one chat-completions chunk. `[DONE]` yields nothing.
pub fn openai_delta(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(data)
        .map_err(|e| RagError::completion("openai", format!("malformed event: {}", e)))?;

    if let Some(message) = value["error"]["message"].as_str() {
        return Err(RagError::completion("openai", message));
    }
    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string))
}
