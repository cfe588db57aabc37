//! Scripted chat client
//!
//! Answers from canned replies and records every message list it is sent.
//! Backs the `scripted` provider kind (offline dry runs) and the test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ChatClient, Message, OutputSchema, Role, StructuredReply};
use crate::error::LlmError;

/// Which operation a recorded call went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Plain,
    /// Structured call, with the schema name
    Structured(String),
}

/// A call observed by a [`ScriptedClient`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub messages: Vec<Message>,
}

impl RecordedCall {
    pub fn has_role(&self, role: Role) -> bool {
        self.messages.iter().any(|m| m.role == role)
    }
}

/// Chat client driven by canned replies
///
/// Clones share the call log.
#[derive(Clone)]
pub struct ScriptedClient {
    model: String,
    structured_enabled: bool,
    structured: HashMap<String, serde_json::Value>,
    text_rules: Vec<(String, String)>,
    default_text: String,
    failure: Option<String>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            structured_enabled: true,
            structured: HashMap::new(),
            text_rules: Vec::new(),
            default_text: String::new(),
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply to structured calls for `schema_name` with `value`
    pub fn with_structured(mut self, schema_name: impl Into<String>, value: serde_json::Value) -> Self {
        self.structured.insert(schema_name.into(), value);
        self
    }

    /// Report every structured call as unsupported
    pub fn without_structured_output(mut self) -> Self {
        self.structured_enabled = false;
        self
    }

    /// Reply with `reply` to plain calls whose user message contains `pattern`
    pub fn with_text_rule(mut self, pattern: impl Into<String>, reply: impl Into<String>) -> Self {
        self.text_rules.push((pattern.into(), reply.into()));
        self
    }

    /// Reply used when no text rule matches
    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Fail every call with a transport error
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// All calls observed so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, kind: CallKind, messages: &[Message]) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                kind,
                messages: messages.to_vec(),
            });
    }

    fn check_failure(&self) -> Result<(), LlmError> {
        match self.failure {
            Some(ref message) => Err(LlmError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.record(CallKind::Plain, messages);
        self.check_failure()?;

        let user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let reply = self
            .text_rules
            .iter()
            .find(|(pattern, _)| user_text.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_text.clone());
        Ok(reply)
    }

    async fn invoke_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<StructuredReply, LlmError> {
        self.record(CallKind::Structured(schema.name.clone()), messages);
        self.check_failure()?;

        if !self.structured_enabled {
            return Ok(StructuredReply::Unsupported(format!(
                "{} does not support structured output",
                self.model
            )));
        }
        Ok(match self.structured.get(&schema.name) {
            Some(value) => StructuredReply::Value(value.clone()),
            None => StructuredReply::Unsupported(format!("no scripted value for {}", schema.name)),
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
