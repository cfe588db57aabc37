//! Solve step template

pub const SOLVE_PROMPT: &str = r#"Based on this analysis:

{analysis_summary}

Now solve this problem:
{problem}

Provide:
1. Your final answer
2. Step-by-step reasoning
3. Your confidence level (high/medium/low)"#;

/// Solve template for workflows that loop back after a failed verification
pub const SOLVE_REVISION_PROMPT: &str = r#"Based on this analysis:

{analysis_summary}

Now solve this problem:
{problem}

Reviewer feedback on the previous attempt (empty on the first attempt):
{feedback}

Provide:
1. Your final answer
2. Step-by-step reasoning
3. Your confidence level (high/medium/low)"#;
