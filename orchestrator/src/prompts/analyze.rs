//! Analyze step template

pub const ANALYZE_PROMPT: &str = r#"Analyze this problem carefully:

{problem}

Identify:
1. What type of problem this is
2. Key constraints or requirements
3. The best approach to solve it"#;
