//! Model capability port
//!
//! The only path from a step to a chat model. Applies the provider's
//! capability flags (system role, structured output) so steps never need to.

use std::sync::Arc;

use reasonbench_agent::{
    ChatClient, LlmError, Message, ProviderCapability, StructuredReply, SystemPromptFallback,
};

use crate::artifacts::Artifact;

/// A rendered prompt: optional system instruction plus the user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub system: Option<String>,
    pub user: String,
}

impl PromptRequest {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Chat client bound to the capability of its (provider, model)
#[derive(Clone)]
pub struct ModelPort {
    client: Arc<dyn ChatClient>,
    capability: ProviderCapability,
}

impl ModelPort {
    pub fn new(client: Arc<dyn ChatClient>, capability: ProviderCapability) -> Self {
        Self { client, capability }
    }

    pub fn capability(&self) -> ProviderCapability {
        self.capability
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Message list for a request under this port's capability
    ///
    /// A provider without a system role never receives a `system` message.
    /// The instruction is dropped, or prepended to the user message when the
    /// provider is configured with `prepend_to_user`. Empty instructions are
    /// never sent.
    pub fn messages(&self, request: &PromptRequest) -> Vec<Message> {
        let system = request
            .system
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        match system {
            Some(system) if self.capability.supports_system_instruction => {
                vec![Message::system(system), Message::user(&request.user)]
            }
            Some(system) => match self.capability.system_prompt_fallback {
                SystemPromptFallback::Omit => {
                    tracing::debug!(model = %self.model(), "No system role; system prompt omitted");
                    vec![Message::user(&request.user)]
                }
                SystemPromptFallback::PrependToUser => {
                    tracing::debug!(model = %self.model(), "No system role; system prompt prepended to user message");
                    vec![Message::user(format!("{}\n\n{}", system, request.user))]
                }
            },
            None => vec![Message::user(&request.user)],
        }
    }

    /// Ask for a typed artifact
    ///
    /// `Ok(None)` means the model cannot honor the schema: declared
    /// unsupported, reported unsupported, or a reply that does not fit.
    /// `Err` is reserved for transport failures.
    pub async fn try_structured<T: Artifact>(
        &self,
        request: &PromptRequest,
    ) -> Result<Option<T>, LlmError> {
        if !self.capability.attempts_structured() {
            tracing::info!(
                model = %self.model(),
                schema = T::SCHEMA_NAME,
                "Structured output disabled for model, falling back to unstructured"
            );
            return Ok(None);
        }

        let schema = T::output_schema();
        let messages = self.messages(request);
        match self.client.invoke_structured(&messages, &schema).await? {
            StructuredReply::Value(value) => match serde_json::from_value::<T>(value) {
                Ok(artifact) => Ok(Some(artifact)),
                Err(e) => {
                    tracing::info!(
                        model = %self.model(),
                        schema = T::SCHEMA_NAME,
                        "Structured reply did not match schema ({}), falling back to unstructured",
                        e
                    );
                    Ok(None)
                }
            },
            StructuredReply::Unsupported(reason) => {
                tracing::info!(
                    model = %self.model(),
                    schema = T::SCHEMA_NAME,
                    "Structured output unsupported ({}), falling back to unstructured",
                    reason
                );
                Ok(None)
            }
        }
    }

    /// Ask for raw text
    pub async fn get_unstructured(&self, request: &PromptRequest) -> Result<String, LlmError> {
        let messages = self.messages(request);
        self.client.invoke(&messages).await
    }
}
