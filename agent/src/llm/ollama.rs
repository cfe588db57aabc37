//! Ollama LLM implementation
//!
//! Plain calls go through ollama-rs. Structured calls use the `/api/chat`
//! endpoint directly so the JSON schema can be passed as `format`.

use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    Ollama,
};
use serde::{Deserialize, Serialize};

use super::{extract_json, ChatClient, Message, OutputSchema, Role, StructuredReply};
use crate::error::LlmError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct DirectChatRequest<'a> {
    model: &'a str,
    messages: Vec<DirectMessage<'a>>,
    format: &'a serde_json::Value,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct DirectMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct DirectChatResponse {
    message: DirectResponseMessage,
}

#[derive(Debug, Deserialize)]
struct DirectResponseMessage {
    #[serde(default)]
    content: String,
}

/// Ollama client wrapper
pub struct OllamaClient {
    client: Ollama,
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(url: &str, model: &str) -> Self {
        // Parse URL to extract host and port
        let parsed = url::Url::parse(url).ok();
        let scheme = parsed
            .as_ref()
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|| "http".to_string());
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .unwrap_or("localhost")
            .to_string();
        let port = parsed.as_ref().and_then(|u| u.port()).unwrap_or(11434);

        Self {
            client: Ollama::new(format!("{}://{}", scheme, host), port),
            http: reqwest::Client::new(),
            base_url: format!("{}://{}:{}", scheme, host, port),
            model: model.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every request by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        // Convert history to Ollama format
        let messages: Vec<ChatMessage> = messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.clone()),
                Role::User => ChatMessage::user(m.content.clone()),
                Role::Assistant => ChatMessage::assistant(m.content.clone()),
            })
            .collect();

        let request = ChatMessageRequest::new(self.model.clone(), messages);

        let response = tokio::time::timeout(self.timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(response.message.content)
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, LlmError> {
        let request = DirectChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| DirectMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            format: &schema.schema,
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if status == 400 {
            // Older Ollama versions only accept format = "json"
            return Ok(StructuredReply::Unsupported(format!(
                "Ollama rejected schema format: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        if !(200..300).contains(&status) {
            return Err(LlmError::from_status(status, body));
        }

        let parsed: DirectChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;

        Ok(match extract_json(&parsed.message.content) {
            Some(value) => StructuredReply::Value(value),
            None => StructuredReply::Unsupported("reply was not valid JSON".to_string()),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_parsing() {
        let client = OllamaClient::new("http://gpu-box:11500", "qwen3:8b");
        assert_eq!(client.base_url(), "http://gpu-box:11500");
        assert_eq!(client.model(), "qwen3:8b");
    }

    #[test]
    fn test_invalid_url_falls_back_to_localhost() {
        let client = OllamaClient::new("not a url", "llama3.1:8b");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }
}
