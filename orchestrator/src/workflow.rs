//! Built-in workflows and run-state seeding

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use reasonbench_agent::{ProviderCapability, SystemPromptFallback};

use crate::artifacts::Verification;
use crate::calculator::{CalculatorStep, CALCULATOR};
use crate::error::{GraphError, StepError};
use crate::graph::{GraphBuilder, Target, WorkflowDefinition, END};
use crate::nodes::{self, ANALYZE, SOLVE, VERIFY};
use crate::port::ModelPort;
use crate::prompts::SOLVE_REVISION_PROMPT;
use crate::state::{keys, StepResult, WorkflowState};
use crate::step::Step;

pub const REASONING: &str = "reasoning";
pub const REFLECTIVE: &str = "reflective";
pub const CALCULATOR_WORKFLOW: &str = "calculator";

/// Node name of the revision bookkeeping step
pub const REVISE: &str = "revise";

/// Revision cycles allowed by the reflective workflow unless seeded otherwise
pub const DEFAULT_MAX_REVISIONS: u32 = 2;

/// Names accepted by [`workflow_by_name`]
pub const WORKFLOW_NAMES: &[&str] = &[REASONING, REFLECTIVE, CALCULATOR_WORKFLOW];

/// analyze -> solve -> verify
pub fn reasoning_workflow() -> Result<WorkflowDefinition, GraphError> {
    GraphBuilder::new(REASONING)
        .add_node(nodes::analyze())
        .add_node(nodes::solve())
        .add_node(nodes::verify())
        .add_edge(ANALYZE, SOLVE)
        .add_edge(SOLVE, VERIFY)
        .add_edge(VERIFY, END)
        .set_entry(ANALYZE)
        .build()
}

/// analyze -> solve -> verify, looping back through `revise` while the
/// verification fails and revisions remain
///
/// Converges because `revise` decrements `revisions_left` on every cycle.
pub fn reflective_workflow() -> Result<WorkflowDefinition, GraphError> {
    GraphBuilder::new(REFLECTIVE)
        .add_node(nodes::analyze())
        .add_node(nodes::solve().with_default_template(SOLVE_REVISION_PROMPT))
        .add_node(nodes::verify())
        .add_node(ReviseStep)
        .add_edge(ANALYZE, SOLVE)
        .add_edge(SOLVE, VERIFY)
        .add_conditional_edges(VERIFY, vec![REVISE, END], route_after_verify)
        .with_edge_label(VERIFY, "incorrect and revisions left")
        .add_edge(REVISE, SOLVE)
        .set_entry(ANALYZE)
        .build()
}

/// Single arithmetic node, no model calls
pub fn calculator_workflow() -> Result<WorkflowDefinition, GraphError> {
    GraphBuilder::new(CALCULATOR_WORKFLOW)
        .add_node(CalculatorStep::new())
        .add_edge(CALCULATOR, END)
        .set_entry(CALCULATOR)
        .build()
}

/// Look up a built-in workflow
pub fn workflow_by_name(name: &str) -> Option<Result<WorkflowDefinition, GraphError>> {
    match name {
        REASONING => Some(reasoning_workflow()),
        REFLECTIVE => Some(reflective_workflow()),
        CALCULATOR_WORKFLOW => Some(calculator_workflow()),
        _ => None,
    }
}

fn route_after_verify(state: &WorkflowState) -> Target {
    let is_correct = state
        .artifact::<Verification>()
        .map(|v| v.is_correct)
        .unwrap_or(true);
    let revisions_left = state.get::<u32>(keys::REVISIONS_LEFT, 0);

    if !is_correct && revisions_left > 0 {
        Target::node(REVISE)
    } else {
        Target::End
    }
}

/// Spends one revision and hands the verifier's issues to the solver
struct ReviseStep;

#[async_trait]
impl Step for ReviseStep {
    fn name(&self) -> &str {
        REVISE
    }

    async fn execute(
        &self,
        _port: &ModelPort,
        state: &WorkflowState,
    ) -> Result<StepResult, StepError> {
        let revisions_left = state.get::<u32>(keys::REVISIONS_LEFT, 0).saturating_sub(1);
        let feedback = state
            .artifact::<Verification>()
            .map(|v| v.issues_found.join("\n"))
            .unwrap_or_default();

        tracing::info!(revisions_left, "Revising solution");
        Ok(StepResult::new()
            .with(keys::REVISIONS_LEFT, revisions_left)
            .with(keys::FEEDBACK, feedback))
    }
}

/// Per-node prompt entry of a prompt set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePrompt {
    /// Template; empty means the step's default
    #[serde(default)]
    pub prompt: String,
    /// Whether this node sends the system instruction
    #[serde(default = "default_true")]
    pub system_prompt_included: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NodePrompt {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            system_prompt_included: true,
        }
    }
}

/// Everything needed to build the initial state of one run
#[derive(Debug, Clone, Default)]
pub struct StateSeed {
    pub prompt_name: String,
    pub problem: String,
    pub system_prompt: String,
    pub nodes: IndexMap<String, NodePrompt>,
    pub max_revisions: Option<u32>,
}

impl StateSeed {
    pub fn new(prompt_name: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            problem: problem.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_node(mut self, node: impl Into<String>, prompt: NodePrompt) -> Self {
        self.nodes.insert(node.into(), prompt);
        self
    }

    /// Initial state for a model with `capability`
    pub fn build(&self, capability: &ProviderCapability) -> WorkflowState {
        let delivers_system = capability.supports_system_instruction
            || capability.system_prompt_fallback == SystemPromptFallback::PrependToUser;

        let mut state = WorkflowState::new()
            .with(keys::PROMPT_NAME, self.prompt_name.as_str())
            .with(keys::PROBLEM, self.problem.as_str())
            .with(keys::SYSTEM_PROMPT, self.system_prompt.as_str())
            .with(keys::USE_SYSTEM_PROMPT, delivers_system)
            .with(
                keys::REVISIONS_LEFT,
                self.max_revisions.unwrap_or(DEFAULT_MAX_REVISIONS),
            );

        for (node, prompt) in &self.nodes {
            if !prompt.prompt.trim().is_empty() {
                state.insert(keys::template_key(node), prompt.prompt.as_str());
            }
            state.insert(keys::system_flag_key(node), prompt.system_prompt_included);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reasonbench_agent::llm::ScriptedClient;
    use reasonbench_agent::Role;
    use serde_json::json;

    use crate::artifacts::Solution;

    #[test]
    fn test_builtin_workflows_build() {
        for name in WORKFLOW_NAMES {
            let definition = workflow_by_name(name).unwrap().unwrap();
            assert_eq!(definition.name(), *name);
        }
        assert!(workflow_by_name("nope").is_none());
    }

    #[test]
    fn test_seed_applies_capability_and_nodes() {
        let seed = StateSeed::new("cubes", "What is 3^3?")
            .with_system_prompt("Be exact.")
            .with_node(
                SOLVE,
                NodePrompt {
                    prompt: "Solve {problem}".to_string(),
                    system_prompt_included: false,
                },
            );

        let state = seed.build(&ProviderCapability::no_system_instruction());
        assert!(!state.flag(keys::USE_SYSTEM_PROMPT, true));
        assert_eq!(state.str("solve_prompt", ""), "Solve {problem}");
        assert!(!state.flag(&keys::system_flag_key(SOLVE), true));
        assert_eq!(state.str(keys::PROBLEM, ""), "What is 3^3?");

        let prepend = ProviderCapability {
            system_prompt_fallback: SystemPromptFallback::PrependToUser,
            ..ProviderCapability::no_system_instruction()
        };
        assert!(seed.build(&prepend).flag(keys::USE_SYSTEM_PROMPT, false));
    }

    #[tokio::test]
    async fn test_calculator_workflow_makes_no_calls() {
        let client = ScriptedClient::new("m");
        let port = ModelPort::new(Arc::new(client.clone()), ProviderCapability::default());
        let state = StateSeed::new("cubes", "What is 3^3?").build(&port.capability());

        let run = calculator_workflow().unwrap().instantiate(port).run(state).await.unwrap();
        assert_eq!(run.state.artifact::<Solution>().unwrap().answer, "27");
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reflective_workflow_stops_after_budget() {
        let client = ScriptedClient::new("m")
            .with_structured("ProblemAnalysis", json!({"problem_type": "mathematical", "key_constraints": [], "approach": "power"}))
            .with_structured("Solution", json!({"answer": "9", "reasoning_steps": [], "confidence": "high"}))
            .with_structured("Verification", json!({"is_correct": false, "issues_found": ["3^3 is 27"], "final_answer": "27"}));
        let port = ModelPort::new(Arc::new(client.clone()), ProviderCapability::no_system_instruction());
        let mut seed = StateSeed::new("cubes", "What is 3^3?").with_system_prompt("Be exact.");
        seed.max_revisions = Some(2);

        let run = reflective_workflow()
            .unwrap()
            .instantiate(port)
            .run(seed.build(&ProviderCapability::no_system_instruction()))
            .await
            .unwrap();

        assert_eq!(
            run.trace,
            vec!["analyze", "solve", "verify", "revise", "solve", "verify", "revise", "solve", "verify"]
        );
        assert_eq!(run.state.get::<u32>(keys::REVISIONS_LEFT, 99), 0);
        assert_eq!(run.state.str(keys::FEEDBACK, ""), "3^3 is 27");
        let calls = client.calls();
        assert_eq!(calls.len(), 7);
        assert!(calls.iter().all(|call| !call.has_role(Role::System)));
        assert!(calls[5].messages[0].content.contains("3^3 is 27"));
    }

    #[test]
    fn test_reflective_mermaid_shows_loop() {
        let diagram = reflective_workflow().unwrap().to_mermaid();
        assert!(diagram.contains("verify -.->|incorrect and revisions left| revise"));
        assert!(diagram.contains("revise --> solve"));
    }
}
