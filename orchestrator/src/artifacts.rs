//! Typed artifacts produced by the reasoning steps
//!
//! Each artifact has one schema regardless of provenance: the structured
//! path deserializes it from the model's JSON, the fallback path builds it
//! from free text with the heuristics in [`crate::heuristics`].

use std::fmt;

use reasonbench_agent::OutputSchema;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::state::keys;

/// A schema-bearing value a step writes into the workflow state
pub trait Artifact:
    Serialize + DeserializeOwned + JsonSchema + Clone + Send + Sync + 'static
{
    /// Name sent to providers alongside the JSON schema
    const SCHEMA_NAME: &'static str;
    /// State key the artifact is stored under
    const STATE_KEY: &'static str;

    fn output_schema() -> OutputSchema {
        OutputSchema {
            name: Self::SCHEMA_NAME.to_string(),
            schema: schemars::schema_for!(Self).to_value(),
        }
    }
}

/// Confidence level of a solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[default]
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Output of the analyze step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProblemAnalysis {
    /// Type of problem (e.g. mathematical, logical, creative)
    pub problem_type: String,
    /// Key constraints or requirements
    #[serde(default)]
    pub key_constraints: Vec<String>,
    /// Recommended approach to solve it
    pub approach: String,
}

impl Default for ProblemAnalysis {
    fn default() -> Self {
        Self {
            problem_type: "general".to_string(),
            key_constraints: vec!["answer accurately".to_string()],
            approach: "Standard problem solving".to_string(),
        }
    }
}

impl ProblemAnalysis {
    /// Rendering used as `{analysis_summary}` in downstream prompts
    pub fn summary(&self) -> String {
        format!(
            "Problem Type: {}\nConstraints: {}\nApproach: {}",
            self.problem_type,
            self.key_constraints.join(", "),
            self.approach
        )
    }
}

impl Artifact for ProblemAnalysis {
    const SCHEMA_NAME: &'static str = "ProblemAnalysis";
    const STATE_KEY: &'static str = keys::ANALYSIS;
}

/// Output of the solve step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Solution {
    /// The final answer
    pub answer: String,
    /// Step-by-step reasoning
    #[serde(default)]
    pub reasoning_steps: Vec<String>,
    /// Confidence level
    #[serde(default)]
    pub confidence: Confidence,
}

impl Default for Solution {
    fn default() -> Self {
        Self {
            answer: "Unable to generate solution".to_string(),
            reasoning_steps: vec!["Attempted to solve".to_string()],
            confidence: Confidence::Low,
        }
    }
}

impl Solution {
    /// Rendering used as `{solution_summary}` in downstream prompts
    pub fn summary(&self) -> String {
        format!(
            "Answer: {}\nReasoning: {}\nConfidence: {}",
            self.answer,
            self.reasoning_steps.join(" -> "),
            self.confidence
        )
    }
}

impl Artifact for Solution {
    const SCHEMA_NAME: &'static str = "Solution";
    const STATE_KEY: &'static str = keys::SOLUTION;
}

/// Output of the verify step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verification {
    /// Whether the solution is correct
    pub is_correct: bool,
    /// Issues found, if any
    #[serde(default)]
    pub issues_found: Vec<String>,
    /// The verified final answer
    #[serde(default)]
    pub final_answer: String,
}

impl Default for Verification {
    fn default() -> Self {
        Self {
            is_correct: true,
            issues_found: Vec::new(),
            final_answer: String::new(),
        }
    }
}

impl Artifact for Verification {
    const SCHEMA_NAME: &'static str = "Verification";
    const STATE_KEY: &'static str = keys::VERIFICATION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summaries() {
        let analysis = ProblemAnalysis {
            problem_type: "mathematical".to_string(),
            key_constraints: vec!["exact".to_string(), "integer".to_string()],
            approach: "compute".to_string(),
        };
        assert_eq!(
            analysis.summary(),
            "Problem Type: mathematical\nConstraints: exact, integer\nApproach: compute"
        );

        let solution = Solution {
            answer: "27".to_string(),
            reasoning_steps: vec!["3^3".to_string(), "27".to_string()],
            confidence: Confidence::High,
        };
        assert_eq!(
            solution.summary(),
            "Answer: 27\nReasoning: 3^3 -> 27\nConfidence: high"
        );
    }

    #[test]
    fn test_confidence_accepts_capitalized() {
        let solution: Solution =
            serde_json::from_value(json!({"answer": "x", "confidence": "High"})).unwrap();
        assert_eq!(solution.confidence, Confidence::High);
        assert!(solution.reasoning_steps.is_empty());
    }

    #[test]
    fn test_output_schema_names_fields() {
        let schema = Verification::output_schema();
        assert_eq!(schema.name, "Verification");
        let text = schema.schema.to_string();
        assert!(text.contains("is_correct"));
        assert!(text.contains("final_answer"));
    }
}
