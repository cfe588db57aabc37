//! LLM abstraction layer
//!
//! A [`ChatClient`] exposes two operations against a chat model:
//! a plain call returning raw text, and a schema-constrained call that
//! either yields a JSON value or reports that the model cannot honor
//! the schema.

mod ollama;
mod openai;
mod scripted;

pub use ollama::OllamaClient;
pub use openai::OpenAiCompatClient;
pub use scripted::{CallKind, RecordedCall, ScriptedClient};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::LlmError;

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// JSON schema a structured call must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Schema name (e.g. "Solution"), sent to providers that require one
    pub name: String,
    /// JSON Schema document
    pub schema: serde_json::Value,
}

/// Outcome of a structured call that reached the model
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredReply {
    /// The model returned a JSON value
    Value(serde_json::Value),
    /// The provider or model cannot produce output for this schema
    Unsupported(String),
}

/// Trait for chat model backends
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send messages and get the raw text reply
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Send messages asking for output that conforms to `schema`
    ///
    /// Must return `Ok(StructuredReply::Unsupported(..))`, not an error,
    /// when the model cannot honor the schema. `Err` is reserved for
    /// transport failures (auth, network, rate limit).
    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, LlmError>;

    /// Get the model name
    fn model(&self) -> &str;
}

/// Build the chat client for one model of a configured provider
pub fn connect(provider: &ProviderConfig, model: &str) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match provider.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiCompatClient::from_provider(provider, model)?),
        ProviderKind::Ollama => Arc::new(
            OllamaClient::new(&provider.base_url, model).with_timeout(provider.timeout()),
        ),
        ProviderKind::Scripted => Arc::new(
            ScriptedClient::new(model)
                .without_structured_output()
                .with_default_text(format!("[{}] scripted reply", model)),
        ),
    };
    tracing::debug!(provider = %provider.name, model = %model, kind = ?provider.kind, "Client ready");
    Ok(client)
}

/// Pull a JSON value out of model text
///
/// Accepts bare JSON, JSON wrapped in a ``` fence, or JSON embedded in
/// surrounding prose (first `{` to last `}`).
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
