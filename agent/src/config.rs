//! Configuration loading

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capability::{
    CapabilityOverride, ProviderCapability, StructuredOutputSupport, SystemPromptFallback,
};
use crate::error::LlmError;

/// Default config file name
pub const CONFIG_FILE: &str = "reasonbench.toml";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/reasonbench/
///
/// Returns the path if found, None otherwise.
pub fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback: Check global config
    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("reasonbench").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

/// Load `.env` from the current directory or any parent, if present
///
/// Returns the path that was loaded. Existing environment variables win.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!("Failed to load .env: {}", e);
            None
        }
    }
}

/// Top-level benchmark configuration (from reasonbench.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub output: OutputConfig,
    /// Providers in sweep order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Output section
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// One `<provider>_<model>.log` per configured model
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Kind of backend a provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` server
    #[default]
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// Native Ollama API
    Ollama,
    /// Offline scripted replies (dry runs)
    Scripted,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub supports_system_prompt: bool,

    #[serde(default)]
    pub supports_structured_output: StructuredOutputSupport,

    #[serde(default)]
    pub system_prompt_fallback: SystemPromptFallback,

    #[serde(default)]
    pub models: Vec<String>,

    /// Per-model capability overrides, keyed by model name
    #[serde(default)]
    pub model_overrides: HashMap<String, CapabilityOverride>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Create a provider with defaults for everything but name and kind
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: default_base_url(),
            api_key_env: None,
            timeout: default_timeout(),
            temperature: default_temperature(),
            default_headers: HashMap::new(),
            supports_system_prompt: true,
            supports_structured_output: StructuredOutputSupport::Auto,
            system_prompt_fallback: SystemPromptFallback::Omit,
            models: Vec::new(),
            model_overrides: HashMap::new(),
        }
    }

    pub fn with_models(mut self, models: Vec<impl Into<String>>) -> Self {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_system_prompt_support(mut self, supported: bool) -> Self {
        self.supports_system_prompt = supported;
        self
    }

    pub fn with_structured_output(mut self, support: StructuredOutputSupport) -> Self {
        self.supports_structured_output = support;
        self
    }

    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Read the API key from the configured environment variable
    ///
    /// Returns `Ok(None)` when the provider needs no key.
    pub fn api_key(&self) -> Result<Option<String>, LlmError> {
        match self.api_key_env {
            Some(ref var) => match std::env::var(var) {
                Ok(key) if !key.is_empty() => Ok(Some(key)),
                _ => Err(LlmError::MissingApiKey(var.clone())),
            },
            None => Ok(None),
        }
    }

    /// Provider defaults with the model's override applied
    pub fn capability_for(&self, model: &str) -> ProviderCapability {
        let base = ProviderCapability {
            supports_system_instruction: self.supports_system_prompt,
            supports_structured_output: self.supports_structured_output,
            system_prompt_fallback: self.system_prompt_fallback,
        };
        match self.model_overrides.get(model) {
            Some(override_) => override_.apply_to(base),
            None => base,
        }
    }
}

impl BenchConfig {
    /// Load config from reasonbench.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for reasonbench.toml
    /// 2. Check ~/.config/reasonbench/reasonbench.toml (global fallback)
    /// 3. Fall back to defaults (no providers)
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(CONFIG_FILE) {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No {} found, using defaults", CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get a provider by name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                anyhow::bail!("Duplicate provider name: {}", provider.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[output]
results_dir = "out"

[[providers]]
name = "zeta"
kind = "openai"
base_url = "https://api.example.com/v1"
api_key_env = "ZETA_KEY"
timeout = 30
supports_system_prompt = false
supports_structured_output = true
models = ["z-large", "z-small"]

[providers.default_headers]
X-Client = "reasonbench"

[providers.model_overrides.z-small]
supports_structured_output = false

[[providers]]
name = "alpha"
kind = "ollama"
base_url = "http://localhost:11434"
models = ["llama3.1:8b"]
"#;

    #[test]
    fn test_parse_sample_keeps_provider_order() {
        let config = BenchConfig::from_toml(SAMPLE).unwrap();
        let names: Vec<_> = config.providers.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(config.output.results_dir, PathBuf::from("out"));
        assert_eq!(config.output.logs_dir, PathBuf::from("logs"));
        assert_eq!(config.providers[0].timeout(), Duration::from_secs(30));
        assert_eq!(config.providers[1].kind, ProviderKind::Ollama);
        assert_eq!(
            config.providers[0].default_headers.get("X-Client").map(String::as_str),
            Some("reasonbench")
        );
    }

    #[test]
    fn test_capability_for_applies_model_override() {
        let config = BenchConfig::from_toml(SAMPLE).unwrap();
        let zeta = config.provider("zeta").unwrap();

        let large = zeta.capability_for("z-large");
        assert!(!large.supports_system_instruction);
        assert_eq!(large.supports_structured_output, StructuredOutputSupport::Supported);

        let small = zeta.capability_for("z-small");
        assert!(!small.supports_system_instruction);
        assert_eq!(small.supports_structured_output, StructuredOutputSupport::Unsupported);
    }

    #[test]
    fn test_defaults() {
        let config = BenchConfig::from_toml("[[providers]]\nname = \"local\"\n").unwrap();
        let provider = &config.providers[0];

        assert_eq!(provider.kind, ProviderKind::OpenAi);
        assert!(provider.supports_system_prompt);
        assert_eq!(provider.supports_structured_output, StructuredOutputSupport::Auto);
        assert_eq!(provider.timeout, 60);
        assert!(provider.models.is_empty());
        assert_eq!(config.output.results_dir, PathBuf::from("results"));
        assert_eq!(config.output.logs_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let toml = "[[providers]]\nname = \"a\"\n[[providers]]\nname = \"a\"\n";
        assert!(BenchConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let mut provider = ProviderConfig::new("p", ProviderKind::OpenAi);
        provider.api_key_env = Some("REASONBENCH_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        assert!(matches!(provider.api_key(), Err(LlmError::MissingApiKey(_))));

        provider.api_key_env = None;
        assert!(matches!(provider.api_key(), Ok(None)));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = BenchConfig::load_from_path(&path).unwrap();
        assert_eq!(config.providers.len(), 2);
    }
}
