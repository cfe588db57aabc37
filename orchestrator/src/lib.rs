//! Workflow engine for reasonbench
//!
//! This crate provides:
//! - `WorkflowState` / `StepResult` with field-wise merge and total accessors
//! - Typed artifacts (analysis, solution, verification) and their schemas
//! - The model capability port with structured-then-unstructured fallback
//! - Analyze / solve / verify steps, plus an arithmetic step that needs no model
//! - A graph engine with unconditional, conditional and cyclic edges
//!
//! # Example
//!
//! ```rust,ignore
//! use orchestrator::{reasoning_workflow, ModelPort, StateSeed};
//!
//! let definition = reasoning_workflow()?;
//! let port = ModelPort::new(client, capability);
//! let state = StateSeed::new("cubes", "What is 3^3?").build(&capability);
//!
//! let run = definition.instantiate(port).run(state).await?;
//! ```

pub mod artifacts;
pub mod calculator;
pub mod error;
pub mod graph;
pub mod heuristics;
pub mod nodes;
pub mod port;
pub mod prompts;
pub mod state;
pub mod step;
pub mod workflow;

pub use artifacts::{Artifact, Confidence, ProblemAnalysis, Solution, Verification};
pub use calculator::CalculatorStep;
pub use error::{GraphError, StepError, WorkflowError};
pub use graph::{
    Edge, GraphBuilder, GraphRun, NodeStatus, Target, WorkflowDefinition, WorkflowGraph, END,
};
pub use port::{ModelPort, PromptRequest};
pub use state::{keys, StepResult, WorkflowState};
pub use step::{compose_request, structured_or_fallback, Provenance, ReasoningStep, Step};
pub use workflow::{
    calculator_workflow, reasoning_workflow, reflective_workflow, workflow_by_name, NodePrompt,
    StateSeed, WORKFLOW_NAMES,
};
