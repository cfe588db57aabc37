//! Provider capability resolution
//!
//! Capabilities are resolved once per (provider, model) before a sweep and
//! are read-only afterwards. Structured output support is either declared
//! or left as `Auto`, in which case it is tried on every structured call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

/// Whether a model honors schema-constrained output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "RawStructuredSupport")]
pub enum StructuredOutputSupport {
    /// Unknown; attempt the structured call and fall back when it fails
    #[default]
    Auto,
    /// Declared supported
    Supported,
    /// Declared unsupported; never attempt the structured call
    Unsupported,
}

/// Accepts `true`, `false` or `"auto"` in config files
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStructuredSupport {
    Flag(bool),
    Mode(String),
}

impl TryFrom<RawStructuredSupport> for StructuredOutputSupport {
    type Error = String;

    fn try_from(raw: RawStructuredSupport) -> Result<Self, Self::Error> {
        match raw {
            RawStructuredSupport::Flag(true) => Ok(Self::Supported),
            RawStructuredSupport::Flag(false) => Ok(Self::Unsupported),
            RawStructuredSupport::Mode(mode) => match mode.to_lowercase().as_str() {
                "auto" | "unknown" => Ok(Self::Auto),
                "supported" | "true" => Ok(Self::Supported),
                "unsupported" | "false" => Ok(Self::Unsupported),
                other => Err(format!(
                    "invalid supports_structured_output value: {} (expected true, false or \"auto\")",
                    other
                )),
            },
        }
    }
}

/// What to do with the system instruction when the provider has no system role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemPromptFallback {
    /// Drop the system instruction entirely
    #[default]
    Omit,
    /// Prepend the system instruction to the user message
    PrependToUser,
}

/// Capabilities of one model of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapability {
    pub supports_system_instruction: bool,
    pub supports_structured_output: StructuredOutputSupport,
    pub system_prompt_fallback: SystemPromptFallback,
}

impl Default for ProviderCapability {
    fn default() -> Self {
        Self {
            supports_system_instruction: true,
            supports_structured_output: StructuredOutputSupport::Auto,
            system_prompt_fallback: SystemPromptFallback::Omit,
        }
    }
}

impl ProviderCapability {
    /// Capability for a provider without a system role
    pub fn no_system_instruction() -> Self {
        Self {
            supports_system_instruction: false,
            ..Default::default()
        }
    }

    /// Capability for a model declared unable to produce structured output
    pub fn unstructured_only() -> Self {
        Self {
            supports_structured_output: StructuredOutputSupport::Unsupported,
            ..Default::default()
        }
    }

    /// Whether a structured call should be attempted at all
    pub fn attempts_structured(&self) -> bool {
        self.supports_structured_output != StructuredOutputSupport::Unsupported
    }
}

/// Per-model override of provider-level capability settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_system_prompt: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_structured_output: Option<StructuredOutputSupport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_fallback: Option<SystemPromptFallback>,
}

impl CapabilityOverride {
    /// Apply overrides to base capabilities
    pub fn apply_to(&self, mut caps: ProviderCapability) -> ProviderCapability {
        if let Some(v) = self.supports_system_prompt {
            caps.supports_system_instruction = v;
        }
        if let Some(v) = self.supports_structured_output {
            caps.supports_structured_output = v;
        }
        if let Some(v) = self.system_prompt_fallback {
            caps.system_prompt_fallback = v;
        }
        caps
    }
}

/// Read-only capability lookup for every configured (provider, model)
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<(String, String), ProviderCapability>,
}

impl CapabilityTable {
    /// Resolve capabilities for every model of every provider
    pub fn resolve(providers: &[ProviderConfig]) -> Self {
        let mut entries = HashMap::new();
        for provider in providers {
            for model in &provider.models {
                let caps = provider.capability_for(model);
                tracing::debug!(provider = %provider.name, model = %model, ?caps, "Resolved capability");
                entries.insert((provider.name.clone(), model.clone()), caps);
            }
        }
        Self { entries }
    }

    /// Capability for a model; unknown pairs get the defaults
    pub fn get(&self, provider: &str, model: &str) -> ProviderCapability {
        self.entries
            .get(&(provider.to_string(), model.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
