//! Model access layer for reasonbench
//!
//! Everything the workflow engine needs from the outside world:
//! - A `ChatClient` port with plain and schema-constrained calls
//! - OpenAI-compatible, Ollama and scripted (offline) clients
//! - Provider configuration (`reasonbench.toml`)
//! - Per-model capability resolution

pub mod capability;
pub mod config;
pub mod error;
pub mod llm;

pub use capability::{
    CapabilityOverride, CapabilityTable, ProviderCapability, StructuredOutputSupport,
    SystemPromptFallback,
};
pub use config::{load_dotenv, BenchConfig, OutputConfig, ProviderConfig, ProviderKind};
pub use error::LlmError;
pub use llm::{ChatClient, Message, OutputSchema, Role, StructuredReply};
