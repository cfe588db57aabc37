//! Reasonbench Benchmark Harness
//!
//! Runs one reasoning workflow per (prompt set, provider, model) triple,
//! skipping triples already run in this session, isolating failures, and
//! streaming every outcome to a results file as it is produced.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reasonbench::{BenchmarkRunner, PromptLibrary, RunnerConfig};
//!
//! let library = PromptLibrary::load_dir("prompts")?;
//! let runner = BenchmarkRunner::with_defaults(RunnerConfig::default())?;
//! let records = runner.run_all(library.sets(), &config.providers, false, None).await?;
//! ```

pub mod aggregate;
pub mod logs;
pub mod prompt_sets;
pub mod reporter;
pub mod runner;
pub mod sink;

use chrono::{DateTime, Utc};
use orchestrator::{keys, GraphRun, Solution, Verification, WorkflowState};
use serde::{Deserialize, Serialize};

/// Uniquely identifies one workflow execution; the deduplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunIdentity {
    pub prompt: String,
    pub provider: String,
    pub model: String,
}

impl RunIdentity {
    pub fn new(
        prompt: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.prompt, self.provider, self.model)
    }
}

/// Final state of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessReport {
    /// Final workflow state
    pub response: WorkflowState,
    /// Nodes that produced their artifact through the unstructured fallback
    #[serde(default)]
    pub fallback_nodes: Vec<String>,
    /// Nodes in execution order
    #[serde(default)]
    pub trace: Vec<String>,
    /// Nodes the traversal never reached (e.g. an unused revise branch)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_nodes: Vec<String>,
}

impl SuccessReport {
    pub fn from_run(run: GraphRun) -> Self {
        let mut fallback_nodes: Vec<String> = Vec::new();
        for node in &run.trace {
            let fell_back = run.state.str(&keys::source_key(node), "") == "fallback";
            if fell_back && !fallback_nodes.contains(node) {
                fallback_nodes.push(node.clone());
            }
        }
        let pending_nodes = run.pending_nodes().into_iter().map(str::to_string).collect();
        Self {
            response: run.state,
            fallback_nodes,
            trace: run.trace,
            pending_nodes,
        }
    }

    pub fn verification(&self) -> Option<Verification> {
        self.response.artifact::<Verification>()
    }

    pub fn answer(&self) -> Option<String> {
        self.response.artifact::<Solution>().map(|s| s.answer)
    }
}

/// Outcome of one triple; produced exactly once per identity per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success(SuccessReport),
    Skipped { reason: String },
    Failed { error: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }

    /// Success whose verification says correct
    pub fn is_verified_correct(&self) -> bool {
        match self {
            RunOutcome::Success(report) => report
                .verification()
                .map(|v| v.is_correct)
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// One row of the results file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(flatten)]
    pub identity: RunIdentity,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

// Re-export important items
pub use aggregate::{BenchmarkSummary, ProviderSummary};
pub use logs::RunLogLayer;
pub use prompt_sets::{PromptLibrary, PromptSet};
pub use reporter::{OutputFormat, Reporter};
pub use runner::{BenchmarkRunner, ClientFactory, ConfiguredClients, RunnerConfig};
pub use sink::{outcome_channel, OutcomeReceiver, OutcomeSender, ResultSink, ResultsDocument};
