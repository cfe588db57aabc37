//! OpenAI-compatible chat completions client
//!
//! Works with any server exposing `/chat/completions` (OpenAI, OpenRouter,
//! Groq, vLLM, Ollama's `/v1` endpoint, ...). Structured calls use
//! `response_format: json_schema`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{extract_json, ChatClient, Message, OutputSchema, StructuredReply};
use crate::config::ProviderConfig;
use crate::error::LlmError;

/// Statuses a server uses to reject a `response_format` it does not support
const UNSUPPORTED_FORMAT_STATUSES: &[u16] = &[400, 404, 415, 422, 501];

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenAI-compatible client
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    /// Create a client with default transport settings
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            model: model.to_string(),
            temperature: 0.7,
        }
    }

    /// Create a client from a provider section of `reasonbench.toml`
    pub fn from_provider(provider: &ProviderConfig, model: &str) -> Result<Self, LlmError> {
        let headers = build_headers(&provider.default_headers)?;
        let http = reqwest::Client::builder()
            .timeout(provider.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key()?,
            model: model.to_string(),
            temperature: provider.temperature,
        })
    }

    /// Set the API key sent as a bearer token
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Replace the HTTP client with one using the given timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn request<'a>(
        &'a self,
        messages: &'a [Message],
        response_format: Option<serde_json::Value>,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.temperature,
            response_format,
        }
    }

    /// POST the request; returns the status code and raw body
    async fn post(&self, body: &ChatCompletionRequest<'_>) -> Result<(u16, String), LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, messages = body.messages.len(), structured = body.response_format.is_some(), "Sending chat completion");

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }

    fn parse_message(raw: &str) -> Result<ChoiceMessage, LlmError> {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(raw).map_err(|e| LlmError::Decode(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = self.request(messages, None);
        let (status, raw) = self.post(&request).await?;
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, raw));
        }

        let message = Self::parse_message(&raw)?;
        Ok(message.content.unwrap_or_default())
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, LlmError> {
        let response_format = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": false,
            }
        });
        let request = self.request(messages, Some(response_format));
        let (status, raw) = self.post(&request).await?;

        if UNSUPPORTED_FORMAT_STATUSES.contains(&status) {
            return Ok(StructuredReply::Unsupported(format!(
                "server rejected response_format ({}): {}",
                status,
                truncate(&raw, 200)
            )));
        }
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, raw));
        }

        let message = Self::parse_message(&raw)?;
        if let Some(refusal) = message.refusal {
            return Ok(StructuredReply::Unsupported(format!("model refused: {}", refusal)));
        }
        let content = message.content.unwrap_or_default();
        Ok(match extract_json(&content) {
            Some(value) => StructuredReply::Value(value),
            None => StructuredReply::Unsupported("reply was not valid JSON".to_string()),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn build_headers(
    headers: &std::collections::HashMap<String, String>,
) -> Result<HeaderMap, LlmError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::Transport(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::Transport(format!("invalid header value: {}", e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
