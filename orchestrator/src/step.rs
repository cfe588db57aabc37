//! Step trait and the shared structured-then-unstructured protocol

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use reasonbench_agent::LlmError;

use crate::artifacts::Artifact;
use crate::error::StepError;
use crate::port::{ModelPort, PromptRequest};
use crate::prompts;
use crate::state::{keys, StepResult, WorkflowState};

/// A named unit of work in a workflow graph
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Read the state, do the work, return only the keys this step owns
    ///
    /// Only transport failures are returned as errors.
    async fn execute(&self, port: &ModelPort, state: &WorkflowState)
        -> Result<StepResult, StepError>;
}

/// How a step obtained its artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Structured,
    Fallback,
    /// Produced without a model call
    Computed,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Structured => "structured",
            Provenance::Fallback => "fallback",
            Provenance::Computed => "computed",
        }
    }
}

/// Try the structured call first; on `None` ask for text and parse it
///
/// Always attempts the structured call, whatever earlier steps did.
pub async fn structured_or_fallback<T, F>(
    port: &ModelPort,
    request: &PromptRequest,
    parse: F,
) -> Result<(T, Provenance), LlmError>
where
    T: Artifact,
    F: FnOnce(&str) -> T + Send,
{
    if let Some(artifact) = port.try_structured::<T>(request).await? {
        return Ok((artifact, Provenance::Structured));
    }

    let text = port.get_unstructured(request).await?;
    tracing::debug!(schema = T::SCHEMA_NAME, chars = text.len(), "Parsing unstructured reply");
    Ok((parse(&text), Provenance::Fallback))
}

/// Render the prompt of `node` from the state
///
/// The template comes from the state key `{node}_prompt`, else `default`.
/// Placeholders resolve from `inputs` first, then from any text field of
/// the state, else render empty. The system instruction is attached unless
/// the run or the node opts out.
pub fn compose_request(
    state: &WorkflowState,
    node: &str,
    default: &str,
    inputs: &HashMap<&'static str, String>,
) -> PromptRequest {
    let template = state.str(&keys::template_key(node), "");
    let template = if template.trim().is_empty() {
        default
    } else {
        template.as_str()
    };

    let user = prompts::render(template, |name| {
        inputs
            .get(name)
            .map(String::as_str)
            .or_else(|| state.raw(name).and_then(|v| v.as_str()))
    });

    let wants_system = state.flag(keys::USE_SYSTEM_PROMPT, true)
        && state.flag(&keys::system_flag_key(node), true);
    let system = state.str(keys::SYSTEM_PROMPT, "");

    PromptRequest {
        system: (wants_system && !system.trim().is_empty()).then_some(system),
        user,
    }
}

/// Placeholder values a step derives from the state
pub type InputsFn = fn(&WorkflowState) -> HashMap<&'static str, String>;

/// Turns a free-text reply into an artifact, with the state for context
pub type ParseFn<T> = fn(&str, &WorkflowState) -> T;

/// An LLM step defined entirely by data: a template, its inputs, a parser
pub struct ReasoningStep<T> {
    name: String,
    default_template: &'static str,
    inputs: InputsFn,
    parse: ParseFn<T>,
    _artifact: PhantomData<fn() -> T>,
}

impl<T: Artifact> ReasoningStep<T> {
    pub fn new(
        name: impl Into<String>,
        default_template: &'static str,
        inputs: InputsFn,
        parse: ParseFn<T>,
    ) -> Self {
        Self {
            name: name.into(),
            default_template,
            inputs,
            parse,
            _artifact: PhantomData,
        }
    }

    /// Same step under another node name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Template used when the state carries none for this node
    pub fn with_default_template(mut self, template: &'static str) -> Self {
        self.default_template = template;
        self
    }
}

#[async_trait]
impl<T: Artifact> Step for ReasoningStep<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        port: &ModelPort,
        state: &WorkflowState,
    ) -> Result<StepResult, StepError> {
        let inputs = (self.inputs)(state);
        let request = compose_request(state, &self.name, self.default_template, &inputs);

        let parse = self.parse;
        let (artifact, provenance) =
            structured_or_fallback::<T, _>(port, &request, |text| parse(text, state))
                .await
                .map_err(|e| StepError::new(&self.name, e))?;

        tracing::info!(
            node = %self.name,
            source = provenance.as_str(),
            "{} complete",
            T::SCHEMA_NAME
        );

        Ok(StepResult::new()
            .with_artifact(&artifact)
            .with(keys::source_key(&self.name), provenance.as_str()))
    }
}
