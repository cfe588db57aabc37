//! Shared workflow state
//!
//! One `WorkflowState` is owned by exactly one graph run. Steps read it
//! through total accessors and return a `StepResult` holding only the keys
//! they are responsible for; the graph merges that result field by field.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifacts::Artifact;

/// Well-known state keys
pub mod keys {
    /// The seed problem text
    pub const PROBLEM: &str = "problem";
    /// System instruction of the prompt set
    pub const SYSTEM_PROMPT: &str = "system_prompt";
    /// Whether the system instruction reaches the model in any form
    pub const USE_SYSTEM_PROMPT: &str = "use_system_prompt";
    /// Name of the prompt set being run
    pub const PROMPT_NAME: &str = "prompt_name";
    pub const ANALYSIS: &str = "analysis";
    pub const SOLUTION: &str = "solution";
    pub const VERIFICATION: &str = "verification";
    /// Issues carried back to the solver on a revision cycle
    pub const FEEDBACK: &str = "feedback";
    /// Revision cycles still allowed
    pub const REVISIONS_LEFT: &str = "revisions_left";

    /// Key holding the prompt template of `node` (e.g. `solve_prompt`)
    pub fn template_key(node: &str) -> String {
        format!("{}_prompt", node)
    }

    /// Key holding whether `node` sends the system instruction
    pub fn system_flag_key(node: &str) -> String {
        format!("{}_system_prompt_included", node)
    }

    /// Key recording how `node` produced its artifact ("structured" or "fallback")
    pub fn source_key(node: &str) -> String {
        format!("{}_source", node)
    }
}

/// Ordered mapping from field name to value, accumulated across steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    fields: IndexMap<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw value for a key
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Typed read that never fails
    ///
    /// Returns `default` when the key is absent or its value does not have
    /// the expected shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.fields
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Text read that never fails; scalars are rendered, containers fall back
    pub fn str(&self, key: &str, default: &str) -> String {
        match self.fields.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Boolean read that never fails
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.fields.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Typed artifact stored under its state key, if present and well-formed
    pub fn artifact<T: Artifact>(&self) -> Option<T> {
        self.fields
            .get(T::STATE_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Merge a step result: every returned key overwrites, every other key stays
    pub fn merge(&mut self, result: StepResult) {
        for (key, value) in result.fields {
            self.fields.insert(key, value);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }
}

/// Partial state update returned by a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResult {
    fields: IndexMap<String, Value>,
}

impl StepResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Store an artifact under its own state key
    pub fn with_artifact<T: Artifact>(self, artifact: &T) -> Self {
        let value = serde_json::to_value(artifact).unwrap_or_default();
        self.with(T::STATE_KEY, value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Confidence, Solution};
    use serde_json::json;

    #[test]
    fn test_merge_is_field_wise() {
        let mut state = WorkflowState::new().with("problem", "p").with("x", 0);

        state.merge(StepResult::new().with("x", 1));
        state.merge(StepResult::new().with("y", 2));

        assert_eq!(state.raw("problem"), Some(&json!("p")));
        assert_eq!(state.raw("x"), Some(&json!(1)));
        assert_eq!(state.raw("y"), Some(&json!(2)));
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["problem", "x", "y"]);
    }

    #[test]
    fn test_total_accessors() {
        let state = WorkflowState::new()
            .with("n", 3)
            .with("text", "hello")
            .with("obj", json!({"a": 1}))
            .with("yes", "true");

        assert_eq!(state.get::<u32>("n", 0), 3);
        assert_eq!(state.get::<u32>("text", 7), 7);
        assert_eq!(state.get::<Vec<String>>("missing", vec![]), Vec::<String>::new());
        assert_eq!(state.str("n", ""), "3");
        assert_eq!(state.str("obj", "fallback"), "fallback");
        assert!(state.flag("yes", false));
        assert!(state.flag("missing", true));
        assert!(!state.flag("obj", false));
    }

    #[test]
    fn test_artifact_round_trip_and_bad_shape() {
        let solution = Solution {
            answer: "27".to_string(),
            reasoning_steps: vec!["3 * 3 * 3".to_string()],
            confidence: Confidence::High,
        };
        let mut state = WorkflowState::new();
        state.merge(StepResult::new().with_artifact(&solution));
        assert_eq!(state.artifact::<Solution>(), Some(solution));

        let broken = WorkflowState::new().with("solution", "just text");
        assert_eq!(broken.artifact::<Solution>(), None);
    }
}
