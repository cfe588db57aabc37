//! Heuristic parsing of free-text replies
//!
//! Used when a model cannot produce structured output. Every function here
//! is total: any input string yields a fully populated artifact.

use std::sync::LazyLock;

use regex::Regex;

use crate::artifacts::{Confidence, ProblemAnalysis, Solution, Verification};

/// Maximum answer length kept from a free-text reply, in chars
pub const MAX_ANSWER_CHARS: usize = 500;

// ============================================================================
// Patterns
// ============================================================================

static THINK_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("Invalid think tag regex")
});

static LIST_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)]|step\s+\d+[:.])\s+(.+?)\s*$").expect("Invalid list item regex")
});

static ANSWER_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:final\s+)?answer\W*\s*[:=]\s*(.+)$").expect("Invalid answer regex")
});

static CONFIDENCE_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confidence(?:\s+level)?\W*\s*[:=-]?\s*\**\s*(high|medium|low)\b")
        .expect("Invalid confidence regex")
});

static HIGH_CONFIDENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:certain|definitely|clearly|obviously)\b").expect("Invalid regex")
});

static LOW_CONFIDENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:maybe|possibly|uncertain|not\s+sure)\b").expect("Invalid regex")
});

/// Phrases that mention a defect only to deny it; removed before the verdict check
static NEGATED_DEFECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:no|without|free\s+of|zero)\s+(?:\w+\s+)?(?:errors?|mistakes?)|(?:errors?|mistakes?)[-\s]free)\b",
    )
    .expect("Invalid regex")
});

static NEGATIVE_VERDICT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:incorrect|wrong|errors?|mistakes?|not\s+correct)\b").expect("Invalid regex")
});

static ISSUE_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:issues?|problems?|concerns?)\b").expect("Invalid regex")
});

/// Strip `<think>...</think>` blocks emitted by reasoning models
pub fn strip_think_tags(content: &str) -> String {
    THINK_TAG_REGEX.replace_all(content, "").trim().to_string()
}

fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| LIST_ITEM_REGEX.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('*').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

// ============================================================================
// Analysis
// ============================================================================

/// Build a `ProblemAnalysis` from a free-text reply
pub fn parse_analysis(response: &str) -> ProblemAnalysis {
    let text = strip_think_tags(response);
    if text.is_empty() {
        return ProblemAnalysis::default();
    }
    let lower = text.to_lowercase();

    let problem_type = if contains_any(&lower, &["math", "arithmetic", "calculation", "number"]) {
        "mathematical"
    } else if contains_any(&lower, &["logic", "reasoning"]) {
        "logical"
    } else if contains_any(&lower, &["creative", "design", "write"]) {
        "creative"
    } else {
        "general"
    };

    let key_constraints = constraint_items(&text);
    let key_constraints = if key_constraints.is_empty() {
        vec!["answer accurately".to_string(), "provide explanation".to_string()]
    } else {
        key_constraints
    };

    let approach = text
        .lines()
        .find(|line| line.to_lowercase().contains("approach"))
        .map(|line| {
            let item = LIST_ITEM_REGEX
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
                .unwrap_or(line);
            item.trim().trim_matches('*').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "Standard problem solving approach".to_string());

    ProblemAnalysis {
        problem_type: problem_type.to_string(),
        key_constraints,
        approach,
    }
}

/// List items directly following the first line that mentions constraints
fn constraint_items(text: &str) -> Vec<String> {
    let mut lines = text.lines().skip_while(|line| {
        let lower = line.to_lowercase();
        !(lower.contains("constraint") || lower.contains("requirement"))
    });
    if lines.next().is_none() {
        return Vec::new();
    }

    let block: Vec<&str> = lines
        .skip_while(|line| line.trim().is_empty())
        .take_while(|line| LIST_ITEM_REGEX.is_match(line))
        .collect();
    list_items(&block.join("\n"))
}

// ============================================================================
// Solution
// ============================================================================

/// Build a `Solution` from a free-text reply
pub fn parse_solution(response: &str) -> Solution {
    let text = strip_think_tags(response);
    if text.is_empty() {
        return Solution::default();
    }

    let answer = ANSWER_MARKER_REGEX
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().trim_matches('*').trim())
        .filter(|answer| !answer.is_empty())
        .unwrap_or(&text);

    let reasoning_steps = list_items(&text);
    let reasoning_steps = if reasoning_steps.is_empty() {
        vec![
            "Analyzed the problem".to_string(),
            "Applied knowledge".to_string(),
            "Formulated answer".to_string(),
        ]
    } else {
        reasoning_steps
    };

    Solution {
        answer: truncate_chars(answer, MAX_ANSWER_CHARS),
        reasoning_steps,
        confidence: parse_confidence(&text),
    }
}

/// Explicit "confidence: X" wins, then hedging keywords, else medium
pub fn parse_confidence(text: &str) -> Confidence {
    if let Some(level) = CONFIDENCE_MARKER_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        return match level.as_str().to_lowercase().as_str() {
            "high" => Confidence::High,
            "low" => Confidence::Low,
            _ => Confidence::Medium,
        };
    }

    if HIGH_CONFIDENCE_REGEX.is_match(text) {
        Confidence::High
    } else if LOW_CONFIDENCE_REGEX.is_match(text) {
        Confidence::Low
    } else {
        Confidence::Medium
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Build a `Verification` from a free-text reply
///
/// `upstream_answer` is the answer of the solution being verified; it
/// becomes the final answer.
pub fn parse_verification(response: &str, upstream_answer: &str) -> Verification {
    let text = strip_think_tags(response);
    let final_answer = upstream_answer.to_string();
    if text.is_empty() {
        return Verification {
            final_answer,
            ..Default::default()
        };
    }

    let cleaned = NEGATED_DEFECT_REGEX.replace_all(&text, "");
    let is_correct = !NEGATIVE_VERDICT_REGEX.is_match(&cleaned);

    let issues_found = if is_correct {
        Vec::new()
    } else {
        let issues: Vec<String> = cleaned
            .lines()
            .filter(|line| ISSUE_LINE_REGEX.is_match(line) || NEGATIVE_VERDICT_REGEX.is_match(line))
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        if issues.is_empty() {
            vec!["Potential issues mentioned in verification".to_string()]
        } else {
            issues
        }
    };

    Verification {
        is_correct,
        issues_found,
        final_answer,
    }
}
