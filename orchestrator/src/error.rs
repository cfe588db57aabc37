//! Workflow error taxonomy

use reasonbench_agent::LlmError;
use thiserror::Error;

/// A transport failure surfaced by a step
///
/// Unsupported structured output and malformed upstream state are recovered
/// inside the step and never become a `StepError`.
#[derive(Debug, Error)]
#[error("node '{node}' failed: {source}")]
pub struct StepError {
    pub node: String,
    #[source]
    pub source: LlmError,
}

impl StepError {
    pub fn new(node: impl Into<String>, source: LlmError) -> Self {
        Self {
            node: node.into(),
            source,
        }
    }
}

/// Graph configuration defects
///
/// Raised by `GraphBuilder::build` or at the first transition that hits them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node '{0}' is defined twice")]
    DuplicateNode(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("graph has no entry node")]
    MissingEntry,

    #[error("edge from '{from}' points at unknown node '{to}'")]
    DanglingEdge { from: String, to: String },

    #[error("node '{0}' has no outgoing edge")]
    NoOutgoingEdge(String),

    #[error("node '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    #[error("conditional edge from '{0}' declares no targets")]
    EmptyTargets(String),

    #[error("router of '{node}' returned undeclared target '{target}'")]
    UndeclaredTarget { node: String, target: String },
}

/// Why a graph run produced no final state
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl WorkflowError {
    /// Whether this is a configuration defect rather than a per-run failure
    pub fn is_graph_error(&self) -> bool {
        matches!(self, WorkflowError::Graph(_))
    }
}
