//! Prompt templates for the reasoning steps
//!
//! Prompt sets may replace any of these per node. Templates use `{name}`
//! placeholders; `{{` and `}}` render literal braces.

mod analyze;
mod solve;
mod verify;

pub use analyze::ANALYZE_PROMPT;
pub use solve::{SOLVE_PROMPT, SOLVE_REVISION_PROMPT};
pub use verify::VERIFY_PROMPT;

/// Substitute `{name}` placeholders from `lookup`
///
/// Fails closed: a placeholder `lookup` cannot resolve renders as an empty
/// string. Braces that do not enclose an identifier are kept as written.
pub fn render<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        // tail starts with a single '{'
        match tail[1..].find('}') {
            Some(end) if is_placeholder(&tail[1..1 + end]) => {
                let name = &tail[1..1 + end];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => tracing::debug!(placeholder = name, "Missing template value, rendering empty"),
                }
                rest = &tail[end + 2..];
            }
            _ => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([("problem", "What is 3^3?"), ("analysis_summary", "math")])
    }

    fn render_with(template: &str) -> String {
        let vars = vars();
        render(template, |name| vars.get(name).copied())
    }

    #[test]
    fn test_substitutes_known_placeholders() {
        assert_eq!(render_with("Q: {problem} ({analysis_summary})"), "Q: What is 3^3? (math)");
    }

    #[test]
    fn test_missing_placeholder_renders_empty() {
        assert_eq!(render_with("[{solution_summary}] {problem}"), "[] What is 3^3?");
    }

    #[test]
    fn test_escapes_and_stray_braces() {
        assert_eq!(render_with("{{\"a\": {problem}}}"), "{\"a\": What is 3^3?}");
        assert_eq!(render_with("{ not a placeholder } {"), "{ not a placeholder } {");
        assert_eq!(render_with("trailing }"), "trailing }");
    }

    #[test]
    fn test_default_templates_reference_their_inputs() {
        assert!(ANALYZE_PROMPT.contains("{problem}"));
        assert!(SOLVE_PROMPT.contains("{analysis_summary}"));
        assert!(VERIFY_PROMPT.contains("{solution_summary}"));
    }
}
