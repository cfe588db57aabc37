//! The analyze, solve and verify steps

use std::collections::HashMap;

use crate::artifacts::{ProblemAnalysis, Solution, Verification};
use crate::heuristics;
use crate::prompts::{ANALYZE_PROMPT, SOLVE_PROMPT, VERIFY_PROMPT};
use crate::state::{keys, WorkflowState};
use crate::step::ReasoningStep;

pub const ANALYZE: &str = "analyze";
pub const SOLVE: &str = "solve";
pub const VERIFY: &str = "verify";

/// Identify the problem type, constraints and approach
pub fn analyze() -> ReasoningStep<ProblemAnalysis> {
    ReasoningStep::new(ANALYZE, ANALYZE_PROMPT, analyze_inputs, |text, _| {
        heuristics::parse_analysis(text)
    })
}

/// Answer the problem given the analysis
pub fn solve() -> ReasoningStep<Solution> {
    ReasoningStep::new(SOLVE, SOLVE_PROMPT, solve_inputs, |text, _| {
        heuristics::parse_solution(text)
    })
}

/// Check the solution; the verified answer is the solution's answer
pub fn verify() -> ReasoningStep<Verification> {
    ReasoningStep::new(VERIFY, VERIFY_PROMPT, verify_inputs, |text, state| {
        heuristics::parse_verification(text, &upstream_answer(state))
    })
}

fn upstream_answer(state: &WorkflowState) -> String {
    state
        .artifact::<Solution>()
        .map(|s| s.answer)
        .unwrap_or_default()
}

fn analyze_inputs(state: &WorkflowState) -> HashMap<&'static str, String> {
    HashMap::from([(keys::PROBLEM, state.str(keys::PROBLEM, ""))])
}

fn solve_inputs(state: &WorkflowState) -> HashMap<&'static str, String> {
    let analysis_summary = state
        .artifact::<ProblemAnalysis>()
        .map(|a| a.summary())
        .unwrap_or_default();
    HashMap::from([
        (keys::PROBLEM, state.str(keys::PROBLEM, "")),
        ("analysis_summary", analysis_summary),
        (keys::FEEDBACK, state.str(keys::FEEDBACK, "")),
    ])
}

fn verify_inputs(state: &WorkflowState) -> HashMap<&'static str, String> {
    let solution_summary = state
        .artifact::<Solution>()
        .map(|s| s.summary())
        .unwrap_or_default();
    HashMap::from([
        (keys::PROBLEM, state.str(keys::PROBLEM, "")),
        ("solution_summary", solution_summary),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reasonbench_agent::llm::{CallKind, ScriptedClient};
    use reasonbench_agent::{LlmError, ProviderCapability};
    use serde_json::json;

    use crate::artifacts::Artifact;
    use crate::port::ModelPort;
    use crate::state::StepResult;
    use crate::step::Step;
    use crate::error::StepError;

    fn full_state() -> WorkflowState {
        WorkflowState::new()
            .with(keys::PROBLEM, "What is 3^3?")
            .with(keys::SYSTEM_PROMPT, "You are careful.")
            .with(keys::ANALYSIS, json!({"problem_type": "mathematical", "key_constraints": [], "approach": "power"}))
            .with(keys::SOLUTION, json!({"answer": "27", "reasoning_steps": ["3*3*3"], "confidence": "high"}))
    }

    fn fallback_port() -> ModelPort {
        let client = ScriptedClient::new("m")
            .without_structured_output()
            .with_default_text("");
        ModelPort::new(Arc::new(client), ProviderCapability::default())
    }

    fn steps() -> Vec<Box<dyn Step>> {
        vec![Box::new(analyze()), Box::new(solve()), Box::new(verify())]
    }

    /// Decode the artifact a step owns and check its required fields
    fn assert_well_formed(node: &str, result: &StepResult, upstream_answer: &str) {
        match node {
            ANALYZE => {
                let value = result.get(ProblemAnalysis::STATE_KEY).cloned().unwrap();
                let analysis: ProblemAnalysis = serde_json::from_value(value).unwrap();
                assert!(!analysis.problem_type.is_empty());
                assert!(!analysis.key_constraints.is_empty());
                assert!(!analysis.approach.is_empty());
            }
            SOLVE => {
                let value = result.get(Solution::STATE_KEY).cloned().unwrap();
                let solution: Solution = serde_json::from_value(value).unwrap();
                assert!(!solution.answer.is_empty());
                assert!(!solution.reasoning_steps.is_empty());
            }
            VERIFY => {
                let value = result.get(Verification::STATE_KEY).cloned().unwrap();
                let verification: Verification = serde_json::from_value(value).unwrap();
                assert_eq!(verification.final_answer, upstream_answer);
            }
            other => panic!("unexpected node {}", other),
        }
        assert_eq!(result.get(&keys::source_key(node)).unwrap(), "fallback");
    }

    #[tokio::test]
    async fn test_steps_tolerate_every_missing_key() {
        let port = fallback_port();
        let full = full_state();

        for step in steps() {
            let result = step.execute(&port, &WorkflowState::new()).await.unwrap();
            assert_well_formed(step.name(), &result, "");

            for missing in full.keys().map(str::to_string).collect::<Vec<_>>() {
                let mut state = WorkflowState::new();
                for key in full.keys().filter(|k| *k != missing) {
                    state.insert(key, full.raw(key).cloned().unwrap_or_default());
                }
                let upstream = if missing == keys::SOLUTION { "" } else { "27" };

                let result = step.execute(&port, &state).await.unwrap();
                assert_well_formed(step.name(), &result, upstream);
            }

            // Wrong shapes everywhere
            let garbage = WorkflowState::new()
                .with(keys::PROBLEM, json!([1, 2]))
                .with(keys::ANALYSIS, "not an object")
                .with(keys::SOLUTION, 42);
            let result = step.execute(&port, &garbage).await.unwrap();
            assert_well_formed(step.name(), &result, "");
        }
    }

    #[tokio::test]
    async fn test_results_carry_well_formed_artifacts() {
        let port = fallback_port();
        let mut state = WorkflowState::new().with(keys::PROBLEM, "What is 3^3?");

        for step in steps() {
            let result = step.execute(&port, &state).await.unwrap();
            state.merge(result);
        }

        assert!(state.artifact::<ProblemAnalysis>().is_some());
        assert!(state.artifact::<Solution>().is_some());
        let verification = state.artifact::<Verification>().unwrap();
        assert_eq!(verification.final_answer, "Unable to generate solution");
        assert_eq!(state.str(&keys::source_key(VERIFY), ""), "fallback");
    }

    #[tokio::test]
    async fn test_structured_path_preferred() {
        let client = ScriptedClient::new("m").with_structured(
            "Solution",
            json!({"answer": "27", "reasoning_steps": ["3*3=9", "9*3=27"], "confidence": "high"}),
        );
        let port = ModelPort::new(Arc::new(client.clone()), ProviderCapability::default());

        let result = solve().execute(&port, &full_state()).await.unwrap();
        assert_eq!(result.get(keys::SOLUTION).unwrap()["answer"], "27");
        assert_eq!(result.get("solve_source").unwrap(), "structured");

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Structured("Solution".to_string()));
        assert!(calls[0].messages[1].content.contains("Problem Type: mathematical"));
    }

    #[tokio::test]
    async fn test_fallback_verify_reads_upstream_answer() {
        let client = ScriptedClient::new("m")
            .without_structured_output()
            .with_default_text("That is wrong; 3^3 is not 9.");
        let port = ModelPort::new(Arc::new(client), ProviderCapability::default());

        let result = verify().execute(&port, &full_state()).await.unwrap();
        let verification: Verification =
            serde_json::from_value(result.get(keys::VERIFICATION).unwrap().clone()).unwrap();
        assert!(!verification.is_correct);
        assert_eq!(verification.final_answer, "27");
    }

    #[tokio::test]
    async fn test_transport_failure_names_node() {
        let client = ScriptedClient::new("m").failing("401 unauthorized");
        let port = ModelPort::new(Arc::new(client), ProviderCapability::default());

        let err: StepError = analyze().execute(&port, &full_state()).await.unwrap_err();
        assert_eq!(err.node, ANALYZE);
        assert!(matches!(err.source, LlmError::Transport(_)));
    }
}
