//! Verify step template

pub const VERIFY_PROMPT: &str = r#"Verify this solution:

Original Problem:
{problem}

Proposed Solution:
{solution_summary}

Check:
1. Is the solution correct?
2. Are there any issues or concerns?
3. What is the final verified answer?"#;
